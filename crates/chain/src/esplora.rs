//! Esplora REST implementation of [`ChainClient`].
//!
//! Works against any Esplora-compatible index (Blockstream's esplora,
//! electrs, Nigiri's regtest bundle). Both swap chains run their own index;
//! point one client instance at each.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{ChainClient, TxStatus, Utxo};
use crate::{ChainError, Result};

/// Default per-request deadline. Exceeding it maps to
/// [`ChainError::Unavailable`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Esplora REST API client for one chain.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
    block_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraTx {
    txid: String,
}

impl EsploraClient {
    /// Creates a client with the default request deadline.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a caller-chosen per-request deadline.
    #[must_use]
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChainError::Unavailable(format!(
                "GET {path}: {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_text(path).await?;
        serde_json::from_str(&body).map_err(|e| ChainError::BadResponse(e.to_string()))
    }

    async fn tip_height(&self) -> Result<u64> {
        self.get_text("/blocks/tip/height")
            .await?
            .trim()
            .parse()
            .map_err(|e| ChainError::BadResponse(format!("tip height: {e}")))
    }

    fn confirmations(tip: u64, status: &EsploraStatus) -> u64 {
        match (status.confirmed, status.block_height) {
            (true, Some(height)) if height <= tip => tip - height + 1,
            _ => 0,
        }
    }
}

#[async_trait]
impl ChainClient for EsploraClient {
    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let raw: Vec<EsploraUtxo> = self.get_json(&format!("/address/{address}/utxo")).await?;
        let tip = self.tip_height().await?;
        Ok(raw
            .into_iter()
            .map(|u| Utxo {
                confirmations: Self::confirmations(tip, &u.status),
                txid: u.txid,
                vout: u.vout,
                amount: u.value,
            })
            .collect())
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<Vec<u8>> {
        let body = self.get_text(&format!("/tx/{txid}/hex")).await?;
        hex::decode(body.trim()).map_err(|e| ChainError::BadResponse(format!("tx hex: {e}")))
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            // The index answered; the transaction itself was refused.
            return Err(ChainError::Rejected(body.trim().to_string()));
        }
        let txid = body.trim().to_string();
        tracing::info!(%txid, "broadcast accepted");
        Ok(txid)
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxStatus> {
        let status: EsploraStatus = self.get_json(&format!("/tx/{txid}/status")).await?;
        let tip = self.tip_height().await?;
        Ok(TxStatus {
            confirmations: Self::confirmations(tip, &status),
            block_height: status.block_height,
        })
    }

    async fn get_address_txids(&self, address: &str) -> Result<Vec<String>> {
        let txs: Vec<EsploraTx> = self.get_json(&format!("/address/{address}/txs")).await?;
        Ok(txs.into_iter().map(|t| t.txid).collect())
    }

    fn current_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
