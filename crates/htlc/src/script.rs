//! HTLC redeem script construction and P2SH descriptor derivation.
//!
//! The redeem script has two branches: the claim branch releases funds to
//! whoever presents the hashlock preimage and a signature for the claim
//! key, the refund branch releases funds to the refund key once an absolute
//! locktime has passed.
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <hash> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <hash160(claim_pubkey)> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ELSE
//!     <timelock> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <hash160(refund_pubkey)> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ENDIF
//! ```

use bitcoin::hashes::{hash160, Hash};
use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DROP, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_HASH160, OP_IF,
    OP_SHA256,
};
use bitcoin::script::Builder;
use bitcoin::{ScriptBuf, ScriptHash};

use crate::network::NetworkParams;
use crate::{HtlcError, Result};

/// Largest absolute locktime representable as a positive script number the
/// interpreter accepts for CLTV.
pub const MAX_TIMELOCK: u32 = 0x7fff_ffff;

/// Inputs for building one HTLC.
#[derive(Clone, Debug)]
pub struct HtlcParams {
    /// SHA-256 hashlock digest.
    pub hash: [u8; 32],
    /// Absolute locktime (unix seconds) for the refund branch.
    pub timelock: u32,
    /// Serialized public key (33 or 65 bytes) allowed to claim with the
    /// preimage.
    pub claim_pubkey: Vec<u8>,
    /// Serialized public key (33 or 65 bytes) allowed to refund after the
    /// timelock.
    pub refund_pubkey: Vec<u8>,
    /// Chain whose version bytes derive the P2SH address.
    pub network: NetworkParams,
}

/// An HTLC ready to be funded: the redeem script plus everything derived
/// from it. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcDescriptor {
    /// The redeem script revealed when spending.
    pub redeem_script: ScriptBuf,
    /// Base58check P2SH address funding transactions pay to.
    pub address: String,
    /// The P2SH output script: `OP_HASH160 <hash160(redeem_script)> OP_EQUAL`.
    pub script_pubkey: ScriptBuf,
    /// SHA-256 hashlock digest embedded in the script.
    pub hash: [u8; 32],
    /// Absolute locktime of the refund branch.
    pub timelock: u32,
    /// HASH160 of the claim public key.
    pub claim_key_hash: [u8; 20],
    /// HASH160 of the refund public key.
    pub refund_key_hash: [u8; 20],
    /// Chain the address was derived for.
    pub network: NetworkParams,
}

/// Builds the canonical HTLC redeem script and its P2SH descriptor.
///
/// # Errors
/// Returns `HtlcError::BadPublicKey` if either key is not 33 or 65 bytes,
/// or `HtlcError::BadTimelock` if the timelock is zero (an empty script
/// number, illegal for CLTV) or exceeds [`MAX_TIMELOCK`].
pub fn build_htlc(params: &HtlcParams) -> Result<HtlcDescriptor> {
    if params.timelock == 0 || params.timelock > MAX_TIMELOCK {
        return Err(HtlcError::BadTimelock(params.timelock));
    }
    let claim_key_hash = pubkey_hash(&params.claim_pubkey)?;
    let refund_key_hash = pubkey_hash(&params.refund_pubkey)?;

    let redeem_script = Builder::new()
        .push_opcode(OP_IF)
        .push_opcode(OP_SHA256)
        .push_slice(params.hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(claim_key_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_int(i64::from(params.timelock))
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(refund_key_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script();

    let script_hash = hash160::Hash::hash(redeem_script.as_bytes()).to_byte_array();
    let address = params.network.p2sh_address(&script_hash);
    let script_pubkey = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(script_hash));

    Ok(HtlcDescriptor {
        redeem_script,
        address,
        script_pubkey,
        hash: params.hash,
        timelock: params.timelock,
        claim_key_hash,
        refund_key_hash,
        network: params.network,
    })
}

/// HASH160 of a serialized public key, validating its length.
///
/// # Errors
/// Returns `HtlcError::BadPublicKey` for any length other than 33 or 65.
pub fn pubkey_hash(pubkey: &[u8]) -> Result<[u8; 20]> {
    if pubkey.len() != 33 && pubkey.len() != 65 {
        return Err(HtlcError::BadPublicKey(pubkey.len()));
    }
    Ok(hash160::Hash::hash(pubkey).to_byte_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AddressPayload;

    fn sample_params() -> HtlcParams {
        HtlcParams {
            hash: [0x00; 32],
            timelock: 500_000,
            claim_pubkey: vec![0x02; 33],
            refund_pubkey: vec![0x03; 33],
            network: NetworkParams::BITCOIN,
        }
    }

    #[test]
    fn redeem_script_layout_is_byte_exact() {
        let descriptor = build_htlc(&sample_params()).unwrap();
        let claim_hash = hash160::Hash::hash(&[0x02; 33]).to_byte_array();
        let refund_hash = hash160::Hash::hash(&[0x03; 33]).to_byte_array();

        // OP_IF OP_SHA256 PUSH32 <hash> OP_EQUALVERIFY
        let mut expected = vec![0x63, 0xa8, 0x20];
        expected.extend_from_slice(&[0x00; 32]);
        expected.push(0x88);
        // OP_DUP OP_HASH160 PUSH20 <claim key hash> OP_EQUALVERIFY OP_CHECKSIG
        expected.extend_from_slice(&[0x76, 0xa9, 0x14]);
        expected.extend_from_slice(&claim_hash);
        expected.extend_from_slice(&[0x88, 0xac]);
        // OP_ELSE PUSH3 <500000 LE> OP_CLTV OP_DROP
        expected.extend_from_slice(&[0x67, 0x03, 0x20, 0xa1, 0x07, 0xb1, 0x75]);
        // OP_DUP OP_HASH160 PUSH20 <refund key hash> OP_EQUALVERIFY OP_CHECKSIG OP_ENDIF
        expected.extend_from_slice(&[0x76, 0xa9, 0x14]);
        expected.extend_from_slice(&refund_hash);
        expected.extend_from_slice(&[0x88, 0xac, 0x68]);

        assert_eq!(descriptor.redeem_script.as_bytes(), expected.as_slice());
    }

    #[test]
    fn descriptor_is_deterministic() {
        let a = build_htlc(&sample_params()).unwrap();
        let b = build_htlc(&sample_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_commits_to_redeem_script() {
        let descriptor = build_htlc(&sample_params()).unwrap();
        let script_hash =
            hash160::Hash::hash(descriptor.redeem_script.as_bytes()).to_byte_array();

        assert_eq!(
            NetworkParams::BITCOIN
                .address_payload(&descriptor.address)
                .unwrap(),
            AddressPayload::ScriptHash(script_hash)
        );
        assert!(descriptor.script_pubkey.is_p2sh());
    }

    #[test]
    fn same_script_different_network_changes_address_only() {
        let mut params = sample_params();
        let on_bitcoin = build_htlc(&params).unwrap();
        params.network = NetworkParams::ALT;
        let on_alt = build_htlc(&params).unwrap();

        assert_eq!(on_bitcoin.redeem_script, on_alt.redeem_script);
        assert_ne!(on_bitcoin.address, on_alt.address);
    }

    #[test]
    fn small_timelock_gets_sign_padding() {
        // 144 = 0x90 has the high bit set, so the script number gains a
        // 0x00 sentinel byte.
        let mut params = sample_params();
        params.timelock = 144;
        let descriptor = build_htlc(&params).unwrap();
        let script = descriptor.redeem_script.as_bytes();

        let needle = [0x67, 0x02, 0x90, 0x00, 0xb1];
        assert!(
            script.windows(needle.len()).any(|w| w == needle),
            "OP_ELSE <0x9000> OP_CLTV not found in {}",
            hex::encode(script)
        );
    }

    #[test]
    fn zero_timelock_is_rejected() {
        let mut params = sample_params();
        params.timelock = 0;
        assert!(matches!(
            build_htlc(&params),
            Err(HtlcError::BadTimelock(0))
        ));
    }

    #[test]
    fn oversized_timelock_is_rejected() {
        let mut params = sample_params();
        params.timelock = MAX_TIMELOCK + 1;
        assert!(matches!(build_htlc(&params), Err(HtlcError::BadTimelock(_))));
    }

    #[test]
    fn wrong_pubkey_length_is_rejected() {
        let mut params = sample_params();
        params.claim_pubkey = vec![0x02; 32];
        assert!(matches!(
            build_htlc(&params),
            Err(HtlcError::BadPublicKey(32))
        ));

        let mut params = sample_params();
        params.refund_pubkey = vec![0x04; 66];
        assert!(matches!(
            build_htlc(&params),
            Err(HtlcError::BadPublicKey(66))
        ));
    }

    #[test]
    fn uncompressed_keys_are_accepted() {
        let mut params = sample_params();
        params.claim_pubkey = vec![0x04; 65];
        assert!(build_htlc(&params).is_ok());
    }
}
