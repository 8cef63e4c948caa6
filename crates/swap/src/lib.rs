//! Cross-chain atomic swap coordination.
//!
//! Owns the swap record and drives it through the state machine:
//! `Initialized -> Funded -> {Completed, Refunded}`, with `Failed` reachable
//! from anywhere. Script construction and signing live in `galleon-htlc`;
//! chain access behind the `galleon-chain` client trait. The coordinator
//! never retries internally: every failure is surfaced so the caller's
//! supervisor stays in charge.

use thiserror::Error;

use galleon_chain::ChainError;
use galleon_htlc::HtlcError;

pub mod coordinator;
pub mod policy;
pub mod record;

pub use coordinator::{
    complete_swap, handle_timeout, initiate_swap, verify_funding, watch_for_preimage, ClaimKeys,
    ClaimReport, FundingReport, FundingSide, RefundKeys, RefundReport, SpendAuth, SwapParams,
};
pub use policy::compute_timeouts;
pub use record::{
    ChainPair, ChainSide, FundingOutpoint, JournalHtlc, JournalRecord, PartyAddresses,
    SwapRecord, SwapStatus,
};

/// Errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum SwapError {
    /// A pure-layer failure: malformed key, bad amount, signing failure.
    /// Reported synchronously, never retried.
    #[error(transparent)]
    Htlc(#[from] HtlcError),

    /// Coordinator-level input problem (zero duration, missing key).
    #[error("invalid parameters: {0}")]
    Input(String),

    /// A chain call failed transiently. The record was not mutated; the
    /// caller decides retry and backoff.
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    /// A broadcast was refused or the swap's on-chain reality disagrees
    /// with the requested action. Inspect the swap (possibly via
    /// [`watch_for_preimage`]) before retrying.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An operation was invoked in a state that disallows it.
    #[error("swap is {actual}, operation requires {expected}")]
    InvalidState {
        expected: SwapStatus,
        actual: SwapStatus,
    },
}

impl From<ChainError> for SwapError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(m) | ChainError::BadResponse(m) => Self::ChainUnavailable(m),
            ChainError::Rejected(m) => Self::ProtocolViolation(m),
        }
    }
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, SwapError>;
