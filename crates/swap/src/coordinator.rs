//! The coordinator operations driving a swap across both chains.
//!
//! All pure work (secret generation, script building, signing, extraction)
//! happens synchronously; the only suspension points are chain-client
//! calls. Record mutations happen strictly after a successful network
//! reply, so a cancelled or failed call leaves the record untouched.

use rand::{rngs::OsRng, RngCore};

use galleon_chain::ChainClient;
use galleon_htlc::{
    build_claim_tx, build_htlc, build_refund_tx, extract_preimage, generate_hashlock,
    pubkey_hash, ClaimParams, HtlcError, HtlcParams, NetworkParams, Preimage, RefundParams,
};

use crate::policy::compute_timeouts;
use crate::record::{
    ChainPair, ChainSide, FundingOutpoint, PartyAddresses, SwapRecord, SwapStatus,
};
use crate::{Result, SwapError};

/// Inputs to [`initiate_swap`]. The initiator claims primary and funds alt;
/// the participant funds primary and claims alt.
#[derive(Clone, Debug)]
pub struct SwapParams {
    /// Initiator's serialized public key on the primary chain (claims the
    /// primary HTLC).
    pub initiator_primary_pubkey: Vec<u8>,
    /// Initiator's serialized public key on the alt chain (refunds the alt
    /// HTLC).
    pub initiator_alt_pubkey: Vec<u8>,
    /// Participant's serialized public key on the primary chain (refunds
    /// the primary HTLC).
    pub participant_primary_pubkey: Vec<u8>,
    /// Participant's serialized public key on the alt chain (claims the alt
    /// HTLC).
    pub participant_alt_pubkey: Vec<u8>,
    /// Value locked per chain, minor units.
    pub amounts: ChainPair<u64>,
    /// Nominal swap duration `D` in seconds; alt expires at `T + D`,
    /// primary at `T + 2D`.
    pub nominal_duration: u32,
    /// Swap creation time `T`, unix seconds.
    pub created_at: u64,
    /// Network parameters per chain.
    pub networks: ChainPair<NetworkParams>,
}

/// Key material authorizing one spend: the WIF key, where the funds go,
/// and the fee to pay.
#[derive(Clone)]
pub struct SpendAuth {
    /// WIF-encoded private key for the spending branch.
    pub wif: String,
    /// P2PKH payout address.
    pub destination: String,
    /// Miner fee in minor units.
    pub fee: u64,
}

impl std::fmt::Debug for SpendAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendAuth")
            .field("wif", &"..")
            .field("destination", &self.destination)
            .field("fee", &self.fee)
            .finish()
    }
}

/// Claim authorizations per chain for [`complete_swap`].
#[derive(Clone, Debug, Default)]
pub struct ClaimKeys {
    pub primary: Option<SpendAuth>,
    pub alt: Option<SpendAuth>,
}

/// Refund authorizations per chain for [`handle_timeout`].
#[derive(Clone, Debug, Default)]
pub struct RefundKeys {
    pub primary: Option<SpendAuth>,
    pub alt: Option<SpendAuth>,
}

/// Funding state of one chain as seen by [`verify_funding`].
#[derive(Clone, Debug)]
pub struct FundingSide {
    /// Whether the HTLC holds the required value with the required
    /// confirmations.
    pub funded: bool,
    /// Confirmations of the best matching UTXO; 0 when nothing matches or
    /// when reported from an already-advanced record.
    pub confirmations: u64,
    /// The satisfying outpoint, if one exists.
    pub outpoint: Option<FundingOutpoint>,
}

/// Outcome of [`verify_funding`].
#[derive(Clone, Debug)]
pub struct FundingReport {
    pub primary: FundingSide,
    pub alt: FundingSide,
    /// Swap status after the check.
    pub status: SwapStatus,
}

/// Outcome of [`complete_swap`].
#[derive(Clone, Debug)]
pub struct ClaimReport {
    /// Broadcast claim txid on primary, if that side was claimed.
    pub primary_txid: Option<String>,
    /// Broadcast claim txid on alt, if that side was claimed.
    pub alt_txid: Option<String>,
    /// Error from an alt-side claim attempted after a successful primary
    /// claim; the primary success stands.
    pub alt_error: Option<String>,
    /// Swap status after the operation.
    pub status: SwapStatus,
}

/// Outcome of [`handle_timeout`].
#[derive(Clone, Debug)]
pub struct RefundReport {
    pub primary_txid: Option<String>,
    pub alt_txid: Option<String>,
    /// Swap status after the operation.
    pub status: SwapStatus,
}

/// Creates a swap: draws the secret, computes the asymmetric timelocks,
/// derives both HTLCs, and assembles the record at `Initialized`.
///
/// Pure with respect to the chain clients: no network calls.
///
/// # Errors
/// `SwapError::Input` for zero amounts or timelocks outside the u32 range,
/// `SwapError::Htlc` for bad keys or RNG failure.
pub fn initiate_swap(params: &SwapParams) -> Result<SwapRecord> {
    if params.amounts.primary == 0 || params.amounts.alt == 0 {
        return Err(SwapError::Input("swap amounts must be nonzero".into()));
    }

    let (preimage, hash) = generate_hashlock()?;
    let timeouts = compute_timeouts(params.created_at, params.nominal_duration)?;

    let htlc_primary = build_htlc(&HtlcParams {
        hash,
        timelock: timeouts.primary,
        claim_pubkey: params.initiator_primary_pubkey.clone(),
        refund_pubkey: params.participant_primary_pubkey.clone(),
        network: params.networks.primary,
    })?;
    let htlc_alt = build_htlc(&HtlcParams {
        hash,
        timelock: timeouts.alt,
        claim_pubkey: params.participant_alt_pubkey.clone(),
        refund_pubkey: params.initiator_alt_pubkey.clone(),
        network: params.networks.alt,
    })?;

    let addresses = PartyAddresses {
        initiator_primary: params
            .networks
            .primary
            .p2pkh_address(&pubkey_hash(&params.initiator_primary_pubkey)?),
        initiator_alt: params
            .networks
            .alt
            .p2pkh_address(&pubkey_hash(&params.initiator_alt_pubkey)?),
        participant_primary: params
            .networks
            .primary
            .p2pkh_address(&pubkey_hash(&params.participant_primary_pubkey)?),
        participant_alt: params
            .networks
            .alt
            .p2pkh_address(&pubkey_hash(&params.participant_alt_pubkey)?),
    };

    let record = SwapRecord::new(
        random_id()?,
        preimage,
        addresses,
        ChainPair {
            primary: htlc_primary,
            alt: htlc_alt,
        },
        params.amounts,
        timeouts,
        params.created_at,
    )?;
    tracing::info!(swap = %record.id, "swap initialized");
    Ok(record)
}

/// Checks both chains for HTLC funding and advances `Initialized -> Funded`
/// when both sides simultaneously hold the required value with the required
/// confirmations.
///
/// Idempotent and monotonic: once the swap has advanced past `Initialized`
/// the record is reported as-is without touching the network, so repeated
/// calls can never regress the status.
///
/// # Errors
/// `SwapError::ChainUnavailable` on any chain failure (record unchanged),
/// `SwapError::InvalidState` on a failed swap.
pub async fn verify_funding(
    swap: &mut SwapRecord,
    primary_client: &dyn ChainClient,
    alt_client: &dyn ChainClient,
    required_confirmations: ChainPair<u64>,
) -> Result<FundingReport> {
    match swap.status {
        SwapStatus::Initialized => {}
        SwapStatus::Funded | SwapStatus::Completed | SwapStatus::Refunded => {
            return Ok(report_from_record(swap));
        }
        SwapStatus::Failed => {
            return Err(SwapError::InvalidState {
                expected: SwapStatus::Initialized,
                actual: swap.status,
            })
        }
    }

    let primary = funding_side(
        primary_client,
        &swap.htlc.primary.address,
        swap.amounts.primary,
        required_confirmations.primary,
    )
    .await?;
    let alt = funding_side(
        alt_client,
        &swap.htlc.alt.address,
        swap.amounts.alt,
        required_confirmations.alt,
    )
    .await?;

    if let (true, true, Some(primary_outpoint), Some(alt_outpoint)) = (
        primary.funded,
        alt.funded,
        primary.outpoint.clone(),
        alt.outpoint.clone(),
    ) {
        swap.mark_funded(primary_outpoint, alt_outpoint)?;
        tracing::info!(swap = %swap.id, "both HTLCs funded");
    } else {
        tracing::debug!(
            swap = %swap.id,
            primary_funded = primary.funded,
            alt_funded = alt.funded,
            "funding incomplete"
        );
    }

    Ok(FundingReport {
        primary,
        alt,
        status: swap.status,
    })
}

/// Claims whichever sides the supplied keys authorize, revealing the
/// preimage on-chain. A successful primary claim completes the swap; the
/// alt side is optional and the counterparty can sweep it independently
/// after extracting the preimage from the primary claim.
///
/// # Errors
/// `SwapError::InvalidState` unless the swap is `Funded`;
/// `SwapError::ProtocolViolation` if the record no longer holds the
/// preimage or a broadcast is rejected (inspect via
/// [`watch_for_preimage`]); `SwapError::ChainUnavailable` on transport
/// failure. The signed transaction is deterministic, so rebuilding and
/// re-broadcasting is safe.
pub async fn complete_swap(
    swap: &mut SwapRecord,
    primary_client: &dyn ChainClient,
    alt_client: &dyn ChainClient,
    keys: &ClaimKeys,
) -> Result<ClaimReport> {
    if swap.status != SwapStatus::Funded {
        return Err(SwapError::InvalidState {
            expected: SwapStatus::Funded,
            actual: swap.status,
        });
    }
    if keys.primary.is_none() && keys.alt.is_none() {
        return Err(SwapError::Input("no claim key supplied".into()));
    }
    let preimage = swap
        .preimage
        .clone()
        .ok_or_else(|| SwapError::ProtocolViolation("preimage is not held by this record".into()))?;

    let mut report = ClaimReport {
        primary_txid: None,
        alt_txid: None,
        alt_error: None,
        status: swap.status,
    };

    if let Some(auth) = &keys.primary {
        let txid = claim_side(swap, ChainSide::Primary, primary_client, auth, &preimage).await?;
        swap.mark_completed(ChainSide::Primary, txid.clone(), primary_client.current_time())?;
        tracing::info!(swap = %swap.id, %txid, "primary claim broadcast");
        report.primary_txid = Some(txid);
    }

    if let Some(auth) = &keys.alt {
        match claim_side(swap, ChainSide::Alt, alt_client, auth, &preimage).await {
            Ok(txid) => {
                swap.mark_completed(ChainSide::Alt, txid.clone(), alt_client.current_time())?;
                tracing::info!(swap = %swap.id, %txid, "alt claim broadcast");
                report.alt_txid = Some(txid);
            }
            // The primary claim already defines completion; keep it.
            Err(e) if report.primary_txid.is_some() => {
                tracing::warn!(swap = %swap.id, error = %e, "alt claim failed after primary claim");
                report.alt_error = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    report.status = swap.status;
    Ok(report)
}

/// Refunds whichever funded sides have expired and are key-authorized.
/// The alt timelock expires first; a well-behaved initiator refunds alt
/// promptly instead of waiting for primary expiry.
///
/// The expiry check against the chain's clock happens here; the
/// transaction builder produces a structurally valid refund regardless,
/// and must never be handed an unexpired one.
///
/// # Errors
/// `SwapError::InvalidState` unless the swap is `Funded` or `Refunded`;
/// `SwapError::ProtocolViolation` if no supplied key matches an expired,
/// funded, not-yet-refunded side, or a broadcast is rejected.
pub async fn handle_timeout(
    swap: &mut SwapRecord,
    primary_client: &dyn ChainClient,
    alt_client: &dyn ChainClient,
    keys: &RefundKeys,
) -> Result<RefundReport> {
    if !matches!(swap.status, SwapStatus::Funded | SwapStatus::Refunded) {
        return Err(SwapError::InvalidState {
            expected: SwapStatus::Funded,
            actual: swap.status,
        });
    }
    if keys.primary.is_none() && keys.alt.is_none() {
        return Err(SwapError::Input("no refund key supplied".into()));
    }

    let mut report = RefundReport {
        primary_txid: None,
        alt_txid: None,
        status: swap.status,
    };

    let sides: [(ChainSide, &dyn ChainClient, &Option<SpendAuth>); 2] = [
        (ChainSide::Alt, alt_client, &keys.alt),
        (ChainSide::Primary, primary_client, &keys.primary),
    ];
    for (side, client, auth) in sides {
        let Some(auth) = auth else { continue };
        if swap.refund_tx.side(side).is_some() {
            continue;
        }
        let timeout = u64::from(*swap.timeouts.side(side));
        let now = client.current_time();
        if now <= timeout {
            tracing::debug!(swap = %swap.id, %side, now, timeout, "timelock not yet expired");
            continue;
        }
        let Some(outpoint) = swap.funding.side(side).clone() else {
            continue;
        };

        let descriptor = swap.htlc.side(side);
        let signed = build_refund_tx(&RefundParams {
            funding_txid: parse_txid(&outpoint.txid)?,
            funding_vout: outpoint.vout,
            redeem_script: descriptor.redeem_script.clone(),
            refund_wif: auth.wif.clone(),
            refund_address: auth.destination.clone(),
            input_value: outpoint.amount,
            fee: auth.fee,
            locktime: descriptor.timelock,
            network: descriptor.network,
        })?;
        let txid = client.send_raw_transaction(&signed.hex).await?;
        swap.mark_refunded(side, txid.clone(), now)?;
        tracing::info!(swap = %swap.id, %side, %txid, "refund broadcast");
        match side {
            ChainSide::Primary => report.primary_txid = Some(txid),
            ChainSide::Alt => report.alt_txid = Some(txid),
        }
    }

    if report.primary_txid.is_none() && report.alt_txid.is_none() {
        return Err(SwapError::ProtocolViolation(
            "no expired, funded, key-authorized side to refund".into(),
        ));
    }
    report.status = swap.status;
    Ok(report)
}

/// Scans primary-chain activity at the HTLC address for a spending claim
/// and recovers the preimage from its scriptSig. Idempotent; mutates
/// nothing.
///
/// Returns `Ok(None)` while the HTLC is unspent or was spent by a refund.
///
/// # Errors
/// `SwapError::ChainUnavailable` on chain failure, `SwapError::Htlc` if an
/// observed transaction cannot be decoded.
pub async fn watch_for_preimage(
    swap: &SwapRecord,
    primary_client: &dyn ChainClient,
) -> Result<Option<Preimage>> {
    let funding_txid = swap.funding.primary.as_ref().map(|f| f.txid.as_str());
    let txids = primary_client
        .get_address_txids(&swap.htlc.primary.address)
        .await?;

    for txid in txids {
        if Some(txid.as_str()) == funding_txid {
            continue;
        }
        let raw = primary_client.get_raw_transaction(&txid).await?;
        if let Some(preimage) = extract_preimage(&raw, &swap.hash)? {
            tracing::info!(swap = %swap.id, %txid, "preimage recovered from primary claim");
            return Ok(Some(preimage));
        }
    }
    Ok(None)
}

async fn claim_side(
    swap: &SwapRecord,
    side: ChainSide,
    client: &dyn ChainClient,
    auth: &SpendAuth,
    preimage: &Preimage,
) -> Result<String> {
    let outpoint = swap.funding.side(side).as_ref().ok_or_else(|| {
        SwapError::ProtocolViolation(format!("{side} HTLC funding outpoint unknown"))
    })?;
    let descriptor = swap.htlc.side(side);

    let signed = build_claim_tx(&ClaimParams {
        funding_txid: parse_txid(&outpoint.txid)?,
        funding_vout: outpoint.vout,
        redeem_script: descriptor.redeem_script.clone(),
        preimage: preimage.clone(),
        claim_wif: auth.wif.clone(),
        destination: auth.destination.clone(),
        input_value: outpoint.amount,
        fee: auth.fee,
        network: descriptor.network,
    })?;
    let txid = client.send_raw_transaction(&signed.hex).await?;
    Ok(txid)
}

async fn funding_side(
    client: &dyn ChainClient,
    address: &str,
    required_amount: u64,
    required_confirmations: u64,
) -> Result<FundingSide> {
    let utxos = client.get_address_utxos(address).await?;
    let best = utxos
        .into_iter()
        .filter(|u| u.amount >= required_amount)
        .max_by_key(|u| u.confirmations);

    Ok(match best {
        Some(utxo) => FundingSide {
            funded: utxo.confirmations >= required_confirmations,
            confirmations: utxo.confirmations,
            outpoint: Some(FundingOutpoint {
                txid: utxo.txid,
                vout: utxo.vout,
                amount: utxo.amount,
            }),
        },
        None => FundingSide {
            funded: false,
            confirmations: 0,
            outpoint: None,
        },
    })
}

fn report_from_record(swap: &SwapRecord) -> FundingReport {
    let side = |outpoint: &Option<FundingOutpoint>| FundingSide {
        funded: outpoint.is_some(),
        confirmations: 0,
        outpoint: outpoint.clone(),
    };
    FundingReport {
        primary: side(&swap.funding.primary),
        alt: side(&swap.funding.alt),
        status: swap.status,
    }
}

fn parse_txid(txid: &str) -> Result<bitcoin::Txid> {
    txid.parse()
        .map_err(|e| SwapError::Input(format!("funding txid {txid}: {e}")))
}

fn random_id() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SwapError::Htlc(HtlcError::RngUnavailable(e.to_string())))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleon_htlc::hashlock::sha256;

    fn sample_params() -> SwapParams {
        SwapParams {
            initiator_primary_pubkey: vec![0x02; 33],
            initiator_alt_pubkey: vec![0x03; 33],
            participant_primary_pubkey: vec![0x04; 65],
            participant_alt_pubkey: vec![0x02; 33],
            amounts: ChainPair {
                primary: 100_000,
                alt: 10_000_000,
            },
            nominal_duration: 3_600,
            created_at: 1_700_000_000,
            networks: ChainPair {
                primary: NetworkParams::BITCOIN_REGTEST,
                alt: NetworkParams::ALT_TESTNET,
            },
        }
    }

    #[test]
    fn initiated_swap_binds_hash_to_preimage() {
        let record = initiate_swap(&sample_params()).unwrap();
        assert_eq!(record.status, SwapStatus::Initialized);
        assert_eq!(
            sha256(record.preimage.as_ref().unwrap().as_bytes()),
            record.hash
        );
    }

    #[test]
    fn initiated_swap_has_asymmetric_timelocks() {
        let record = initiate_swap(&sample_params()).unwrap();
        assert_eq!(record.timeouts.alt, 1_700_003_600);
        assert_eq!(record.timeouts.primary, 1_700_007_200);
        assert_eq!(record.htlc.primary.timelock, record.timeouts.primary);
        assert_eq!(record.htlc.alt.timelock, record.timeouts.alt);
    }

    #[test]
    fn htlc_roles_are_wired_correctly() {
        let params = sample_params();
        let record = initiate_swap(&params).unwrap();

        assert_eq!(
            record.htlc.primary.claim_key_hash,
            pubkey_hash(&params.initiator_primary_pubkey).unwrap()
        );
        assert_eq!(
            record.htlc.primary.refund_key_hash,
            pubkey_hash(&params.participant_primary_pubkey).unwrap()
        );
        assert_eq!(
            record.htlc.alt.claim_key_hash,
            pubkey_hash(&params.participant_alt_pubkey).unwrap()
        );
        assert_eq!(
            record.htlc.alt.refund_key_hash,
            pubkey_hash(&params.initiator_alt_pubkey).unwrap()
        );
    }

    #[test]
    fn both_htlcs_share_one_hash() {
        let record = initiate_swap(&sample_params()).unwrap();
        assert_eq!(record.htlc.primary.hash, record.hash);
        assert_eq!(record.htlc.alt.hash, record.hash);
    }

    #[test]
    fn swap_ids_are_unique_32_char_hex() {
        let a = initiate_swap(&sample_params()).unwrap();
        let b = initiate_swap(&sample_params()).unwrap();
        assert_eq!(a.id.len(), 32);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn payout_addresses_follow_network_versions() {
        let record = initiate_swap(&sample_params()).unwrap();
        // Each payout address must decode under its own chain's versions.
        assert!(NetworkParams::BITCOIN_REGTEST
            .address_payload(&record.addresses.initiator_primary)
            .is_ok());
        assert!(NetworkParams::ALT_TESTNET
            .address_payload(&record.addresses.participant_alt)
            .is_ok());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut params = sample_params();
        params.amounts.primary = 0;
        assert!(matches!(
            initiate_swap(&params),
            Err(SwapError::Input(_))
        ));
    }

    #[test]
    fn bad_pubkey_is_rejected() {
        let mut params = sample_params();
        params.participant_alt_pubkey = vec![0x02; 30];
        assert!(matches!(
            initiate_swap(&params),
            Err(SwapError::Htlc(HtlcError::BadPublicKey(30)))
        ));
    }

    #[test]
    fn spend_auth_debug_redacts_the_key() {
        let auth = SpendAuth {
            wif: "cVsecretsecretsecret".into(),
            destination: "addr".into(),
            fee: 1_000,
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("addr"));
    }
}
