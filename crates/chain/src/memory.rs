//! In-memory chain for tests.
//!
//! Holds UTXO sets, raw transactions, address histories, and a controllable
//! clock behind a mutex. Kept separate from the production client so test
//! plumbing never leaks into it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::consensus::deserialize;
use bitcoin::Transaction;

use crate::client::{ChainClient, TxStatus, Utxo};
use crate::{ChainError, Result};

/// A scriptable in-memory [`ChainClient`].
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    utxos: HashMap<String, Vec<Utxo>>,
    raw_txs: HashMap<String, Vec<u8>>,
    statuses: HashMap<String, TxStatus>,
    history: HashMap<String, Vec<String>>,
    broadcasts: Vec<String>,
    now: u64,
    offline: bool,
    reject_reason: Option<String>,
}

impl MockChain {
    /// Creates a chain whose clock starts at `now` (unix seconds).
    #[must_use]
    pub fn new(now: u64) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().now = now;
        chain
    }

    /// Seeds an unspent output at an address.
    pub fn add_utxo(&self, address: &str, utxo: Utxo) {
        let mut state = self.state.lock().unwrap();
        state
            .history
            .entry(address.to_string())
            .or_default()
            .push(utxo.txid.clone());
        state.utxos.entry(address.to_string()).or_default().push(utxo);
    }

    /// Removes every unspent output at an address, as if all were spent.
    pub fn clear_utxos(&self, address: &str) {
        self.state.lock().unwrap().utxos.remove(address);
    }

    /// Registers raw transaction bytes so `get_raw_transaction` can serve
    /// them, optionally attaching the txid to an address history.
    pub fn register_transaction(&self, txid: &str, raw: Vec<u8>, address: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.raw_txs.insert(txid.to_string(), raw);
        state
            .statuses
            .entry(txid.to_string())
            .or_insert(TxStatus { confirmations: 0, block_height: None });
        if let Some(address) = address {
            state
                .history
                .entry(address.to_string())
                .or_default()
                .push(txid.to_string());
        }
    }

    /// Sets a transaction's confirmation state.
    pub fn confirm(&self, txid: &str, confirmations: u64, block_height: Option<u64>) {
        self.state.lock().unwrap().statuses.insert(
            txid.to_string(),
            TxStatus { confirmations, block_height },
        );
    }

    /// Moves the chain clock.
    pub fn set_time(&self, now: u64) {
        self.state.lock().unwrap().now = now;
    }

    /// Makes every subsequent call fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Makes subsequent broadcasts fail with `Rejected`.
    pub fn reject_broadcasts(&self, reason: &str) {
        self.state.lock().unwrap().reject_reason = Some(reason.to_string());
    }

    /// Re-enables broadcasts after [`Self::reject_broadcasts`].
    pub fn accept_broadcasts(&self) {
        self.state.lock().unwrap().reject_reason = None;
    }

    /// Txids broadcast so far, in order.
    #[must_use]
    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    /// Raw bytes of a stored transaction, if any.
    #[must_use]
    pub fn raw_transaction(&self, txid: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().raw_txs.get(txid).cloned()
    }

    fn check_online(state: &State) -> Result<()> {
        if state.offline {
            return Err(ChainError::Unavailable("mock chain offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.utxos.get(address).cloned().unwrap_or_default())
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        state
            .raw_txs
            .get(txid)
            .cloned()
            .ok_or_else(|| ChainError::Unavailable(format!("unknown tx {txid}")))
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        if let Some(reason) = &state.reject_reason {
            return Err(ChainError::Rejected(reason.clone()));
        }

        let bytes =
            hex::decode(tx_hex).map_err(|e| ChainError::Rejected(format!("bad hex: {e}")))?;
        let tx: Transaction = deserialize(&bytes)
            .map_err(|e| ChainError::Rejected(format!("undecodable transaction: {e}")))?;
        let txid = tx.compute_txid().to_string();

        // Idempotent on txid, like a real node.
        if !state.raw_txs.contains_key(&txid) {
            state.raw_txs.insert(txid.clone(), bytes);
            state
                .statuses
                .insert(txid.clone(), TxStatus { confirmations: 0, block_height: None });
        }
        state.broadcasts.push(txid.clone());
        Ok(txid)
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxStatus> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        state
            .statuses
            .get(txid)
            .cloned()
            .ok_or_else(|| ChainError::Unavailable(format!("unknown tx {txid}")))
    }

    async fn get_address_txids(&self, address: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.history.get(address).cloned().unwrap_or_default())
    }

    fn current_time(&self) -> u64 {
        self.state.lock().unwrap().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_utxo() -> Utxo {
        Utxo {
            txid: "aa".repeat(32),
            vout: 0,
            amount: 100_000,
            confirmations: 1,
        }
    }

    #[tokio::test]
    async fn seeded_utxos_are_listed() {
        let chain = MockChain::new(1_700_000_000);
        chain.add_utxo("addr1", sample_utxo());

        let utxos = chain.get_address_utxos("addr1").await.unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].amount, 100_000);
        assert!(chain.get_address_utxos("addr2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_is_idempotent_on_txid() {
        let chain = MockChain::new(0);
        // Minimal valid transaction: 1 input, 1 output, empty scripts.
        let tx = Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![bitcoin::TxIn::default()],
            output: vec![bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(1_000),
                script_pubkey: bitcoin::ScriptBuf::new(),
            }],
        };
        let tx_hex = bitcoin::consensus::encode::serialize_hex(&tx);

        let first = chain.send_raw_transaction(&tx_hex).await.unwrap();
        let second = chain.send_raw_transaction(&tx_hex).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(chain.broadcasts().len(), 2);
        assert!(chain.raw_transaction(&first).is_some());
    }

    #[tokio::test]
    async fn offline_chain_is_unavailable() {
        let chain = MockChain::new(0);
        chain.set_offline(true);
        assert!(matches!(
            chain.get_address_utxos("addr").await,
            Err(ChainError::Unavailable(_))
        ));
        assert!(matches!(
            chain.send_raw_transaction("00").await,
            Err(ChainError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn rejection_switch_rejects_broadcasts_only() {
        let chain = MockChain::new(0);
        chain.add_utxo("addr", sample_utxo());
        chain.reject_broadcasts("txn-mempool-conflict");

        assert!(matches!(
            chain.send_raw_transaction("00").await,
            Err(ChainError::Rejected(_))
        ));
        assert!(chain.get_address_utxos("addr").await.is_ok());
    }

    #[tokio::test]
    async fn clock_is_controllable() {
        let chain = MockChain::new(1_700_000_000);
        assert_eq!(chain.current_time(), 1_700_000_000);
        chain.set_time(1_700_003_601);
        assert_eq!(chain.current_time(), 1_700_003_601);
    }

    #[tokio::test]
    async fn history_includes_funding_and_registered_spends() {
        let chain = MockChain::new(0);
        chain.add_utxo("htlc", sample_utxo());
        chain.register_transaction("bb".repeat(32).as_str(), vec![0x01], Some("htlc"));

        let history = chain.get_address_txids("htlc").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], "aa".repeat(32));
        assert_eq!(history[1], "bb".repeat(32));
    }
}
