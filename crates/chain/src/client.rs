//! The abstract chain-client interface consumed by the coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// An unspent output at an address, as seen by the chain's node or index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction id, display (big-endian) hex.
    pub txid: String,
    /// Output index.
    pub vout: u32,
    /// Value in minor units.
    pub amount: u64,
    /// Confirmation count; 0 while in the mempool.
    pub confirmations: u64,
}

/// Confirmation state of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxStatus {
    /// Confirmation count; 0 while in the mempool.
    pub confirmations: u64,
    /// Height of the including block, if confirmed.
    pub block_height: Option<u64>,
}

/// Node access for one chain.
///
/// All methods may fail with [`crate::ChainError::Unavailable`], which the
/// coordinator treats as transient. Broadcast is idempotent on txid:
/// re-sending an already-accepted transaction returns its txid again.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Lists outputs currently unspent at `address` in the node's view.
    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>>;

    /// Fetches the consensus-serialized bytes of a transaction.
    async fn get_raw_transaction(&self, txid: &str) -> Result<Vec<u8>>;

    /// Broadcasts a hex-serialized transaction, returning its txid.
    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String>;

    /// Queries confirmation state for a transaction.
    async fn get_transaction(&self, txid: &str) -> Result<TxStatus>;

    /// Lists ids of transactions involving `address`, spends included.
    /// This is what makes an already-spent HTLC observable.
    async fn get_address_txids(&self, address: &str) -> Result<Vec<String>>;

    /// The chain's view of the current unix time in seconds. May be chain
    /// time (e.g. median time past) or the host's wall clock.
    fn current_time(&self) -> u64;
}
