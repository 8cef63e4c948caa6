//! Preimage recovery from observed spending transactions.
//!
//! A claim transaction reveals the hashlock preimage as a 32-byte push in
//! its scriptSig. Watching the counterparty's claim and hashing each push
//! is how the other side of the swap learns the secret it needs.

use bitcoin::consensus::deserialize;
use bitcoin::script::Instruction;
use bitcoin::Transaction;

use crate::hashlock::{sha256, Preimage, PREIMAGE_LEN};
use crate::{HtlcError, Result};

/// Scans a serialized transaction for the preimage of `expected_hash`.
///
/// Returns `Ok(None)` when the transaction carries no matching preimage (a
/// refund spend or an unrelated transaction), which is not an error.
///
/// # Errors
/// Returns `HtlcError::MalformedTransaction` if the bytes are not a valid
/// transaction or an input script cannot be decompiled.
pub fn extract_preimage(tx_bytes: &[u8], expected_hash: &[u8; 32]) -> Result<Option<Preimage>> {
    let tx: Transaction =
        deserialize(tx_bytes).map_err(|e| HtlcError::MalformedTransaction(e.to_string()))?;
    extract_from_tx(&tx, expected_hash)
}

/// Scans an already-parsed transaction for the preimage of `expected_hash`.
///
/// Walks every input's scriptSig, ignoring opcodes, and returns the first
/// 32-byte push whose SHA-256 equals the expected hash. A valid claim
/// carries at most one.
///
/// # Errors
/// Returns `HtlcError::MalformedTransaction` if a scriptSig cannot be
/// decompiled into pushes and opcodes.
pub fn extract_from_tx(tx: &Transaction, expected_hash: &[u8; 32]) -> Result<Option<Preimage>> {
    for input in &tx.input {
        for instruction in input.script_sig.instructions() {
            let instruction = instruction
                .map_err(|e| HtlcError::MalformedTransaction(format!("scriptSig: {e}")))?;
            let Instruction::PushBytes(push) = instruction else {
                continue;
            };
            if push.len() != PREIMAGE_LEN {
                continue;
            }
            let mut candidate = [0u8; PREIMAGE_LEN];
            candidate.copy_from_slice(push.as_bytes());
            if sha256(&candidate) == *expected_hash {
                return Ok(Some(Preimage::from_bytes(candidate)));
            }
        }
    }
    Ok(None)
}
