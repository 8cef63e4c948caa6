//! Chain access for the swap coordinator.
//!
//! One [`ChainClient`] instance per chain: UTXO lookup, raw-transaction
//! fetch, broadcast, confirmation queries, and the chain's view of the
//! current time. The production implementation speaks to an Esplora-style
//! REST index; tests use the in-memory [`MockChain`].

use thiserror::Error;

pub mod client;
pub mod esplora;
pub mod memory;

pub use client::{ChainClient, TxStatus, Utxo};
pub use esplora::EsploraClient;
pub use memory::MockChain;

/// Errors surfaced by chain clients.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node or index could not be reached, timed out, or failed
    /// mid-request. Transient: the caller decides whether to retry.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The node accepted the request but rejected the transaction
    /// (already-spent input, invalid script, premature locktime).
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The node answered with something that could not be decoded.
    #[error("malformed chain response: {0}")]
    BadResponse(String),
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
