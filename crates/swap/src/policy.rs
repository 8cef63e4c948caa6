//! The asymmetric timelock policy.
//!
//! Given a nominal duration `D` and a creation time `T`, the chain the
//! initiator funds (alt) expires at `T + D` and the chain the initiator
//! claims (primary) at `T + 2D`. The participant therefore always has a
//! window to claim alt after learning the preimage before the initiator
//! can refund primary, and the initiator always refunds alt before the
//! participant can refund primary. Equal timelocks would let a claim on
//! one side race the refund on the other, so they are rejected outright.

use crate::record::ChainPair;
use crate::{Result, SwapError};

/// Computes both absolute timelocks from the creation time and the
/// caller-chosen nominal duration (seconds).
///
/// # Errors
/// `SwapError::Input` for a zero duration or a timelock that does not fit
/// the 32-bit unix-seconds range script numbers use.
pub fn compute_timeouts(created_at: u64, nominal_duration: u32) -> Result<ChainPair<u32>> {
    if nominal_duration == 0 {
        return Err(SwapError::Input("nominal duration must be nonzero".into()));
    }
    let alt = created_at + u64::from(nominal_duration);
    let primary = created_at + 2 * u64::from(nominal_duration);

    let alt = u32::try_from(alt)
        .map_err(|_| SwapError::Input(format!("alt timelock {alt} exceeds u32 seconds")))?;
    let primary = u32::try_from(primary).map_err(|_| {
        SwapError::Input(format!("primary timelock {primary} exceeds u32 seconds"))
    })?;

    Ok(ChainPair { primary, alt })
}
