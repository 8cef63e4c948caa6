//! HTLC construction and spending for Bitcoin-style UTXO chains.
//!
//! Builds hashed-timelock redeem scripts and their P2SH addresses, signs
//! claim (preimage-reveal) and refund (post-timelock) spending transactions,
//! and recovers preimages from observed claim transactions. Everything here
//! is pure: no networking, no wallet state.

use thiserror::Error;

pub mod extract;
pub mod hashlock;
pub mod network;
pub mod script;
pub mod transaction;

pub use extract::{extract_from_tx, extract_preimage};
pub use hashlock::{generate_hashlock, Preimage};
pub use network::{AddressPayload, DecodedKey, NetworkParams};
pub use script::{build_htlc, pubkey_hash, HtlcDescriptor, HtlcParams};
pub use transaction::{build_claim_tx, build_refund_tx, ClaimParams, RefundParams, SignedTx};

/// Errors that can occur while building or spending an HTLC.
#[derive(Debug, Error)]
pub enum HtlcError {
    /// Public key is neither 33 (compressed) nor 65 (uncompressed) bytes.
    #[error("public key must be 33 or 65 bytes, got {0}")]
    BadPublicKey(usize),

    /// Timelock is zero (illegal for CLTV) or exceeds the 31-bit script range.
    #[error("timelock {0} outside 1..=0x7fffffff")]
    BadTimelock(u32),

    /// Hashlock digest is not 32 bytes.
    #[error("hash must be 32 bytes, got {0}")]
    BadHash(usize),

    /// Private key could not be decoded or does not match the network.
    #[error("bad private key: {0}")]
    BadKey(String),

    /// Address could not be decoded or is the wrong kind for the operation.
    #[error("bad address: {0}")]
    BadAddress(String),

    /// Input value cannot cover the fee plus a non-dust output.
    #[error("input {value} minus fee {fee} leaves less than dust ({dust})")]
    Underfunded { value: u64, fee: u64, dust: u64 },

    /// ECDSA signing or script assembly failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Transaction or script bytes could not be decoded.
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    /// The operating system RNG could not be read.
    #[error("system rng unavailable: {0}")]
    RngUnavailable(String),
}

/// Result type for HTLC operations.
pub type Result<T> = std::result::Result<T, HtlcError>;
