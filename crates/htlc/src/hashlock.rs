//! Hashlock preimage generation and hashing.
//!
//! A preimage is 32 uniformly random bytes drawn from the OS RNG; its
//! hashlock is the single SHA-256 digest. Preimages are secrets: the
//! wrapper zeroizes on drop and never prints its contents.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{HtlcError, Result};

/// Length of a hashlock preimage in bytes.
pub const PREIMAGE_LEN: usize = 32;

/// A 32-byte hashlock preimage.
///
/// Zeroized on drop. `Debug` is intentionally opaque so the secret cannot
/// leak through logging.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Preimage([u8; PREIMAGE_LEN]);

impl Preimage {
    /// Draws a fresh preimage from the operating system RNG.
    ///
    /// # Errors
    /// Returns `HtlcError::RngUnavailable` if the OS RNG cannot be read.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; PREIMAGE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| HtlcError::RngUnavailable(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wraps existing preimage bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; PREIMAGE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a preimage from lowercase hex.
    ///
    /// # Errors
    /// Returns `HtlcError::BadHash` if the input is not 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = hex::decode(s).map_err(|_| HtlcError::BadHash(s.len() / 2))?;
        if bytes.len() != PREIMAGE_LEN {
            let n = bytes.len();
            bytes.zeroize();
            return Err(HtlcError::BadHash(n));
        }
        let mut out = [0u8; PREIMAGE_LEN];
        out.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(out))
    }

    /// Raw preimage bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PREIMAGE_LEN] {
        &self.0
    }

    /// Hex encoding of the preimage. Handle with the same care as the
    /// preimage itself.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// SHA-256 digest of the preimage: the public hashlock.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.0)
    }
}

impl std::fmt::Debug for Preimage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Preimage(..)")
    }
}

/// Generates a preimage and its hashlock in one step.
///
/// # Errors
/// Returns `HtlcError::RngUnavailable` if the OS RNG cannot be read.
pub fn generate_hashlock() -> Result<(Preimage, [u8; 32])> {
    let preimage = Preimage::generate()?;
    let hash = preimage.hash();
    Ok((preimage, hash))
}

/// SHA-256 of arbitrary bytes.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Parses a 32-byte hashlock digest from hex.
///
/// # Errors
/// Returns `HtlcError::BadHash` if the input does not decode to 32 bytes.
pub fn hash_from_hex(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| HtlcError::BadHash(s.len() / 2))?;
    if bytes.len() != 32 {
        return Err(HtlcError::BadHash(bytes.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
