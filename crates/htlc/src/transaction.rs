//! Claim and refund spending transactions for a funded HTLC.
//!
//! Both spend a single P2SH input and pay a single P2PKH output. The input
//! is signed with SIGHASH_ALL over the legacy serialization, substituting
//! the redeem script as the scriptCode, then the scriptSig is assembled so
//! the interpreter takes the claim (`OP_TRUE`) or refund (`OP_FALSE`)
//! branch. All values are integer minor units; the builders never touch
//! floating point.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::{OP_FALSE, OP_TRUE};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::hashlock::Preimage;
use crate::network::{AddressPayload, DecodedKey, NetworkParams};
use crate::{HtlcError, Result};

/// Inputs for building a claim (preimage-reveal) transaction.
#[derive(Clone, Debug)]
pub struct ClaimParams {
    /// Transaction that funded the HTLC.
    pub funding_txid: Txid,
    /// Output index of the HTLC within the funding transaction.
    pub funding_vout: u32,
    /// The HTLC redeem script.
    pub redeem_script: ScriptBuf,
    /// The hashlock preimage being revealed.
    pub preimage: Preimage,
    /// WIF-encoded private key matching the script's claim key hash.
    pub claim_wif: String,
    /// P2PKH address receiving the swept funds.
    pub destination: String,
    /// Value of the HTLC output, minor units.
    pub input_value: u64,
    /// Miner fee, minor units.
    pub fee: u64,
    /// Chain the transaction is built for.
    pub network: NetworkParams,
}

/// Inputs for building a refund (post-timelock) transaction.
#[derive(Clone, Debug)]
pub struct RefundParams {
    /// Transaction that funded the HTLC.
    pub funding_txid: Txid,
    /// Output index of the HTLC within the funding transaction.
    pub funding_vout: u32,
    /// The HTLC redeem script.
    pub redeem_script: ScriptBuf,
    /// WIF-encoded private key matching the script's refund key hash.
    pub refund_wif: String,
    /// P2PKH address receiving the refund.
    pub refund_address: String,
    /// Value of the HTLC output, minor units.
    pub input_value: u64,
    /// Miner fee, minor units.
    pub fee: u64,
    /// Absolute locktime, equal to the HTLC timelock.
    pub locktime: u32,
    /// Chain the transaction is built for.
    pub network: NetworkParams,
}

/// A fully signed transaction ready for broadcast.
///
/// The hex is kept so a broadcast interrupted by a transient chain failure
/// can be retried byte-identically (broadcast is idempotent on txid).
#[derive(Clone, Debug)]
pub struct SignedTx {
    /// The signed transaction.
    pub tx: Transaction,
    /// Its txid (double SHA-256 of the legacy serialization).
    pub txid: Txid,
    /// Legacy-serialized transaction as lowercase hex.
    pub hex: String,
}

/// Builds and signs the claim transaction, revealing the preimage.
///
/// scriptSig: `<sig||0x01> <pubkey> <preimage> OP_TRUE <redeem_script>`.
///
/// # Errors
/// `Underfunded` if the fee consumes the input or leaves dust, `BadKey` for
/// a WIF that does not decode on this network, `BadAddress` for a
/// non-P2PKH destination, `SigningFailed` if sighash or DER assembly fails.
pub fn build_claim_tx(params: &ClaimParams) -> Result<SignedTx> {
    let output_value = spendable_output(params.input_value, params.fee, &params.network)?;
    let key = params.network.decode_wif(&params.claim_wif)?;
    let output = p2pkh_txout(&params.network, &params.destination, output_value)?;

    let mut tx = unsigned_tx(
        params.funding_txid,
        params.funding_vout,
        output,
        Sequence::MAX,
        LockTime::ZERO,
    );
    let (signature, pubkey) = sign_input(&tx, &params.redeem_script, &key)?;

    let script_sig = Builder::new()
        .push_slice(push_bytes(signature)?)
        .push_slice(push_bytes(pubkey)?)
        .push_slice(params.preimage.as_bytes())
        .push_opcode(OP_TRUE)
        .push_slice(push_bytes(params.redeem_script.to_bytes())?)
        .into_script();
    tx.input[0].script_sig = script_sig;

    Ok(seal(tx))
}

/// Builds and signs the refund transaction for a timed-out HTLC.
///
/// scriptSig: `<sig||0x01> <pubkey> OP_FALSE <redeem_script>`. The input
/// sequence is `0xFFFFFFFE` so `nLockTime` is enforced. The result is
/// structurally valid even if the locktime has not yet passed; gating the
/// broadcast is the coordinator's job.
///
/// # Errors
/// Same failure set as [`build_claim_tx`].
pub fn build_refund_tx(params: &RefundParams) -> Result<SignedTx> {
    let output_value = spendable_output(params.input_value, params.fee, &params.network)?;
    let key = params.network.decode_wif(&params.refund_wif)?;
    let output = p2pkh_txout(&params.network, &params.refund_address, output_value)?;

    let mut tx = unsigned_tx(
        params.funding_txid,
        params.funding_vout,
        output,
        Sequence::ENABLE_LOCKTIME_NO_RBF,
        LockTime::from_consensus(params.locktime),
    );
    let (signature, pubkey) = sign_input(&tx, &params.redeem_script, &key)?;

    let script_sig = Builder::new()
        .push_slice(push_bytes(signature)?)
        .push_slice(push_bytes(pubkey)?)
        .push_opcode(OP_FALSE)
        .push_slice(push_bytes(params.redeem_script.to_bytes())?)
        .into_script();
    tx.input[0].script_sig = script_sig;

    Ok(seal(tx))
}

fn unsigned_tx(
    funding_txid: Txid,
    funding_vout: u32,
    output: TxOut,
    sequence: Sequence,
    lock_time: LockTime,
) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time,
        input: vec![TxIn {
            previous_output: OutPoint::new(funding_txid, funding_vout),
            script_sig: ScriptBuf::new(),
            sequence,
            witness: Witness::default(),
        }],
        output: vec![output],
    }
}

/// Checks that `input_value - fee` clears the chain's dust threshold.
fn spendable_output(input_value: u64, fee: u64, network: &NetworkParams) -> Result<u64> {
    let underfunded = HtlcError::Underfunded {
        value: input_value,
        fee,
        dust: network.dust_threshold,
    };
    let output = input_value.checked_sub(fee).ok_or(underfunded)?;
    if output == 0 || output < network.dust_threshold {
        return Err(HtlcError::Underfunded {
            value: input_value,
            fee,
            dust: network.dust_threshold,
        });
    }
    Ok(output)
}

fn p2pkh_txout(network: &NetworkParams, address: &str, value: u64) -> Result<TxOut> {
    match network.address_payload(address)? {
        AddressPayload::PubkeyHash(hash) => Ok(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)),
        }),
        AddressPayload::ScriptHash(_) => Err(HtlcError::BadAddress(format!(
            "{address}: payout destination must be P2PKH"
        ))),
    }
}

/// SIGHASH_ALL legacy signature for input 0 with the redeem script as
/// scriptCode. Returns the DER signature with the sighash byte appended,
/// plus the serialized public key.
fn sign_input(
    tx: &Transaction,
    redeem_script: &ScriptBuf,
    key: &DecodedKey,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(0, redeem_script, EcdsaSighashType::All.to_u32())
        .map_err(|e| HtlcError::SigningFailed(e.to_string()))?;

    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = secp.sign_ecdsa(&message, &key.secret);

    let mut der = signature.serialize_der().to_vec();
    der.push(EcdsaSighashType::All.to_u32() as u8);

    let pubkey = PublicKey::from_secret_key(&secp, &key.secret);
    let pubkey_bytes = if key.compressed {
        pubkey.serialize().to_vec()
    } else {
        pubkey.serialize_uncompressed().to_vec()
    };
    Ok((der, pubkey_bytes))
}

fn push_bytes(bytes: Vec<u8>) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(bytes).map_err(|e| HtlcError::SigningFailed(e.to_string()))
}

fn seal(tx: Transaction) -> SignedTx {
    let txid = tx.compute_txid();
    let hex = serialize_hex(&tx);
    SignedTx { tx, txid, hex }
}
