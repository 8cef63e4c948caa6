//! The swap record and its guarded state transitions.
//!
//! A record is created by `initiate_swap` and mutated only through the
//! transition methods here, which enforce the state DAG and erase the
//! preimage once a swap is refunded without any claim. The journal form is
//! a flat object of strings and integers (byte buffers as hex) so any
//! external store can persist it.

use serde::{Deserialize, Serialize};

use galleon_htlc::{HtlcDescriptor, Preimage};

use crate::{Result, SwapError};

/// Lifecycle state of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    /// Record created, HTLCs derived, nothing observed on-chain yet.
    Initialized,
    /// Both HTLCs funded with the required confirmations.
    Funded,
    /// Claim broadcast on the primary chain.
    Completed,
    /// Refund broadcast on a funded chain after its timelock expired.
    Refunded,
    /// Aborted by the operator or an irrecoverable error.
    Failed,
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Funded => "funded",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which of the two chains a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainSide {
    /// The chain the initiator claims from.
    Primary,
    /// The chain the initiator funds (and refunds first).
    Alt,
}

impl std::fmt::Display for ChainSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Alt => "alt",
        })
    }
}

/// A per-chain pair of values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPair<T> {
    pub primary: T,
    pub alt: T,
}

impl<T> ChainPair<T> {
    /// The value for one side.
    pub fn side(&self, side: ChainSide) -> &T {
        match side {
            ChainSide::Primary => &self.primary,
            ChainSide::Alt => &self.alt,
        }
    }

    /// Mutable value for one side.
    pub fn side_mut(&mut self, side: ChainSide) -> &mut T {
        match side {
            ChainSide::Primary => &mut self.primary,
            ChainSide::Alt => &mut self.alt,
        }
    }
}

/// The UTXO that funded one HTLC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingOutpoint {
    /// Funding txid, display hex.
    pub txid: String,
    /// Output index of the HTLC.
    pub vout: u32,
    /// Funded value in minor units.
    pub amount: u64,
}

/// Payout addresses of the two parties on both chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyAddresses {
    pub initiator_primary: String,
    pub initiator_alt: String,
    pub participant_primary: String,
    pub participant_alt: String,
}

/// One cross-chain swap, owned by the coordinator.
#[derive(Clone, Debug)]
pub struct SwapRecord {
    /// 16 random bytes, hex encoded.
    pub id: String,
    /// The hashlock secret. `None` once erased after a claim-free refund.
    pub preimage: Option<Preimage>,
    /// SHA-256 of the preimage; public.
    pub hash: [u8; 32],
    /// Party payout addresses.
    pub addresses: PartyAddresses,
    /// The two HTLCs, sharing `hash`.
    pub htlc: ChainPair<HtlcDescriptor>,
    /// Locked value per chain, minor units.
    pub amounts: ChainPair<u64>,
    /// Absolute refund timelocks, unix seconds. Always `primary > alt`.
    pub timeouts: ChainPair<u32>,
    /// Funding outpoints once observed.
    pub funding: ChainPair<Option<FundingOutpoint>>,
    /// Broadcast claim txids.
    pub claim_tx: ChainPair<Option<String>>,
    /// Broadcast refund txids.
    pub refund_tx: ChainPair<Option<String>>,
    /// Current lifecycle state.
    pub status: SwapStatus,
    /// Record creation time, unix seconds.
    pub created_at: u64,
    /// Set when the primary claim is broadcast.
    pub completed_at: Option<u64>,
    /// Set when the first refund is broadcast.
    pub refunded_at: Option<u64>,
}

impl SwapRecord {
    /// Assembles a fresh record, checking the construction invariants:
    /// the hash binds the preimage, both HTLCs embed that hash with the
    /// record's timelocks, and the primary timelock keeps at least the
    /// nominal-duration safety margin over the alt timelock.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        preimage: Preimage,
        addresses: PartyAddresses,
        htlc: ChainPair<HtlcDescriptor>,
        amounts: ChainPair<u64>,
        timeouts: ChainPair<u32>,
        created_at: u64,
    ) -> Result<Self> {
        let hash = preimage.hash();
        if htlc.primary.hash != hash || htlc.alt.hash != hash {
            return Err(SwapError::Input(
                "HTLC hashlock does not match the swap preimage".into(),
            ));
        }
        if htlc.primary.timelock != timeouts.primary || htlc.alt.timelock != timeouts.alt {
            return Err(SwapError::Input(
                "HTLC timelock does not match the swap timeouts".into(),
            ));
        }
        let margin = u64::from(timeouts.alt).saturating_sub(created_at);
        if margin == 0 || u64::from(timeouts.primary) < u64::from(timeouts.alt) + margin {
            return Err(SwapError::Input(format!(
                "asymmetric timelocks violated: primary {} alt {} created {created_at}",
                timeouts.primary, timeouts.alt
            )));
        }

        Ok(Self {
            id,
            preimage: Some(preimage),
            hash,
            addresses,
            htlc,
            amounts,
            timeouts,
            funding: ChainPair::default(),
            claim_tx: ChainPair::default(),
            refund_tx: ChainPair::default(),
            status: SwapStatus::Initialized,
            created_at,
            completed_at: None,
            refunded_at: None,
        })
    }

    /// Records the funding outpoints and advances to `Funded`.
    ///
    /// Idempotent once funded; later states are left untouched so repeated
    /// funding checks can never regress the swap.
    ///
    /// # Errors
    /// `SwapError::InvalidState` when called on a failed swap.
    pub fn mark_funded(
        &mut self,
        primary: FundingOutpoint,
        alt: FundingOutpoint,
    ) -> Result<()> {
        match self.status {
            SwapStatus::Initialized => {
                self.funding = ChainPair {
                    primary: Some(primary),
                    alt: Some(alt),
                };
                self.status = SwapStatus::Funded;
                Ok(())
            }
            SwapStatus::Funded | SwapStatus::Completed | SwapStatus::Refunded => Ok(()),
            SwapStatus::Failed => Err(SwapError::InvalidState {
                expected: SwapStatus::Initialized,
                actual: self.status,
            }),
        }
    }

    /// Records a broadcast claim. A primary-chain claim defines completion;
    /// an alt-chain claim is recorded without changing the status.
    ///
    /// # Errors
    /// `SwapError::InvalidState` unless the swap is `Funded` (or already
    /// `Completed`, for the alt side of a finished swap).
    pub fn mark_completed(&mut self, side: ChainSide, txid: String, now: u64) -> Result<()> {
        match (self.status, side) {
            (SwapStatus::Funded, ChainSide::Primary) => {
                self.claim_tx.primary = Some(txid);
                self.status = SwapStatus::Completed;
                self.completed_at = Some(now);
                Ok(())
            }
            (SwapStatus::Funded | SwapStatus::Completed, ChainSide::Alt) => {
                self.claim_tx.alt = Some(txid);
                Ok(())
            }
            _ => Err(SwapError::InvalidState {
                expected: SwapStatus::Funded,
                actual: self.status,
            }),
        }
    }

    /// Records a broadcast refund and advances to `Refunded`. The second
    /// side's refund (after the longer timelock) is recorded under the
    /// same status. If no claim was ever observed the preimage is erased:
    /// nothing on-chain reveals it, and the record should not either.
    ///
    /// # Errors
    /// `SwapError::InvalidState` unless the swap is `Funded` or `Refunded`.
    pub fn mark_refunded(&mut self, side: ChainSide, txid: String, now: u64) -> Result<()> {
        match self.status {
            SwapStatus::Funded | SwapStatus::Refunded => {
                *self.refund_tx.side_mut(side) = Some(txid);
                if self.status != SwapStatus::Refunded {
                    self.status = SwapStatus::Refunded;
                    self.refunded_at = Some(now);
                }
                if self.claim_tx.primary.is_none() && self.claim_tx.alt.is_none() {
                    self.erase_preimage();
                }
                Ok(())
            }
            _ => Err(SwapError::InvalidState {
                expected: SwapStatus::Funded,
                actual: self.status,
            }),
        }
    }

    /// Marks the swap failed. Reachable from any state.
    pub fn mark_failed(&mut self) {
        self.status = SwapStatus::Failed;
    }

    /// Drops the preimage from memory.
    pub fn erase_preimage(&mut self) {
        self.preimage = None;
    }

    /// The journal form: a flat serializable object per the external
    /// store's contract.
    #[must_use]
    pub fn to_journal(&self) -> JournalRecord {
        JournalRecord {
            id: self.id.clone(),
            preimage: self.preimage.as_ref().map(Preimage::to_hex),
            hash: hex::encode(self.hash),
            addresses: self.addresses.clone(),
            htlc_primary: JournalHtlc::from(&self.htlc.primary),
            htlc_alt: JournalHtlc::from(&self.htlc.alt),
            amounts: self.amounts,
            timeouts: self.timeouts,
            funding_tx: ChainPair {
                primary: self.funding.primary.as_ref().map(|f| f.txid.clone()),
                alt: self.funding.alt.as_ref().map(|f| f.txid.clone()),
            },
            claim_tx: self.claim_tx.clone(),
            refund_tx: self.refund_tx.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            refunded_at: self.refunded_at,
        }
    }
}

/// Serialized HTLC subset carried in the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHtlc {
    pub address: String,
    pub redeem_script: String,
    pub script_pubkey: String,
    pub timelock: u32,
}

impl From<&HtlcDescriptor> for JournalHtlc {
    fn from(descriptor: &HtlcDescriptor) -> Self {
        Self {
            address: descriptor.address.clone(),
            redeem_script: hex::encode(descriptor.redeem_script.as_bytes()),
            script_pubkey: hex::encode(descriptor.script_pubkey.as_bytes()),
            timelock: descriptor.timelock,
        }
    }
}

/// The persisted swap record: flat strings and integers only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    pub hash: String,
    pub addresses: PartyAddresses,
    pub htlc_primary: JournalHtlc,
    pub htlc_alt: JournalHtlc,
    pub amounts: ChainPair<u64>,
    pub timeouts: ChainPair<u32>,
    pub funding_tx: ChainPair<Option<String>>,
    pub claim_tx: ChainPair<Option<String>>,
    pub refund_tx: ChainPair<Option<String>>,
    pub status: SwapStatus,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleon_htlc::{build_htlc, HtlcParams, NetworkParams};

    fn sample_record() -> SwapRecord {
        let preimage = Preimage::from_bytes([0x01; 32]);
        let hash = preimage.hash();
        let timeouts = ChainPair { primary: 1_700_007_200, alt: 1_700_003_600 };
        let htlc_primary = build_htlc(&HtlcParams {
            hash,
            timelock: timeouts.primary,
            claim_pubkey: vec![0x02; 33],
            refund_pubkey: vec![0x03; 33],
            network: NetworkParams::BITCOIN_REGTEST,
        })
        .unwrap();
        let htlc_alt = build_htlc(&HtlcParams {
            hash,
            timelock: timeouts.alt,
            claim_pubkey: vec![0x03; 33],
            refund_pubkey: vec![0x02; 33],
            network: NetworkParams::ALT_TESTNET,
        })
        .unwrap();

        SwapRecord::new(
            "00112233445566778899aabbccddeeff".into(),
            preimage,
            PartyAddresses {
                initiator_primary: "i1".into(),
                initiator_alt: "i2".into(),
                participant_primary: "p1".into(),
                participant_alt: "p2".into(),
            },
            ChainPair { primary: htlc_primary, alt: htlc_alt },
            ChainPair { primary: 100_000, alt: 10_000_000 },
            timeouts,
            1_700_000_000,
        )
        .unwrap()
    }

    fn outpoint(txid: &str) -> FundingOutpoint {
        FundingOutpoint { txid: txid.into(), vout: 0, amount: 100_000 }
    }

    #[test]
    fn new_record_starts_initialized_with_bound_hash() {
        let record = sample_record();
        assert_eq!(record.status, SwapStatus::Initialized);
        assert_eq!(
            record.preimage.as_ref().unwrap().hash(),
            record.hash,
            "hash must bind the preimage"
        );
        assert_eq!(record.htlc.primary.hash, record.hash);
        assert_eq!(record.htlc.alt.hash, record.hash);
    }

    #[test]
    fn symmetric_timelocks_are_rejected_at_construction() {
        let record = sample_record();
        // Rebuild with equal timelocks: must fail.
        let preimage = Preimage::from_bytes([0x01; 32]);
        let hash = preimage.hash();
        let equal = ChainPair { primary: 1_700_003_600, alt: 1_700_003_600 };
        let htlc = |timelock| {
            build_htlc(&HtlcParams {
                hash,
                timelock,
                claim_pubkey: vec![0x02; 33],
                refund_pubkey: vec![0x03; 33],
                network: NetworkParams::BITCOIN_REGTEST,
            })
            .unwrap()
        };
        let result = SwapRecord::new(
            record.id.clone(),
            preimage,
            record.addresses.clone(),
            ChainPair { primary: htlc(equal.primary), alt: htlc(equal.alt) },
            record.amounts,
            equal,
            1_700_000_000,
        );
        assert!(matches!(result, Err(SwapError::Input(_))));
    }

    #[test]
    fn funded_then_completed_path() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        assert_eq!(record.status, SwapStatus::Funded);

        record
            .mark_completed(ChainSide::Primary, "c1".into(), 1_700_001_000)
            .unwrap();
        assert_eq!(record.status, SwapStatus::Completed);
        assert_eq!(record.completed_at, Some(1_700_001_000));
        assert!(record.preimage.is_some(), "preimage survives completion");
    }

    #[test]
    fn completion_requires_funding() {
        let mut record = sample_record();
        let err = record
            .mark_completed(ChainSide::Primary, "c1".into(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            SwapError::InvalidState { expected: SwapStatus::Funded, actual: SwapStatus::Initialized }
        ));
    }

    #[test]
    fn alt_claim_alone_does_not_complete() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        record
            .mark_completed(ChainSide::Alt, "c2".into(), 1_700_001_000)
            .unwrap();
        assert_eq!(record.status, SwapStatus::Funded);
        assert_eq!(record.claim_tx.alt.as_deref(), Some("c2"));
    }

    #[test]
    fn refund_erases_preimage_when_nothing_was_claimed() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        record
            .mark_refunded(ChainSide::Alt, "r1".into(), 1_700_003_601)
            .unwrap();

        assert_eq!(record.status, SwapStatus::Refunded);
        assert_eq!(record.refunded_at, Some(1_700_003_601));
        assert!(record.preimage.is_none(), "claim-free refund erases the secret");

        // Second-side refund stays in Refunded, keeps the first timestamp.
        record
            .mark_refunded(ChainSide::Primary, "r2".into(), 1_700_007_201)
            .unwrap();
        assert_eq!(record.status, SwapStatus::Refunded);
        assert_eq!(record.refunded_at, Some(1_700_003_601));
        assert_eq!(record.refund_tx.primary.as_deref(), Some("r2"));
    }

    #[test]
    fn funding_is_idempotent_and_never_regresses() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        record
            .mark_completed(ChainSide::Primary, "c1".into(), 1)
            .unwrap();

        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        assert_eq!(record.status, SwapStatus::Completed);
    }

    #[test]
    fn failed_is_reachable_and_terminal_for_funding() {
        let mut record = sample_record();
        record.mark_failed();
        assert_eq!(record.status, SwapStatus::Failed);
        assert!(record.mark_funded(outpoint("f1"), outpoint("f2")).is_err());
    }

    #[test]
    fn journal_uses_flat_lowercase_form() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        let json = serde_json::to_value(record.to_journal()).unwrap();

        assert_eq!(json["status"], "funded");
        assert_eq!(json["id"], record.id);
        assert_eq!(json["hash"].as_str().unwrap().len(), 64);
        assert_eq!(json["preimage"].as_str().unwrap().len(), 64);
        assert_eq!(json["funding_tx"]["primary"], "f1");
        assert_eq!(json["amounts"]["alt"], 10_000_000);
        assert_eq!(json["timeouts"]["primary"], 1_700_007_200);
        assert!(json["htlc_primary"]["redeem_script"].is_string());
        assert!(json.get("completed_at").is_none(), "unset optionals are omitted");
    }

    #[test]
    fn journal_omits_preimage_after_claim_free_refund() {
        let mut record = sample_record();
        record.mark_funded(outpoint("f1"), outpoint("f2")).unwrap();
        record
            .mark_refunded(ChainSide::Alt, "r1".into(), 1_700_003_601)
            .unwrap();

        let json = serde_json::to_value(record.to_journal()).unwrap();
        assert!(json.get("preimage").is_none());
        assert_eq!(json["status"], "refunded");
    }

    #[test]
    fn journal_round_trips_through_serde() {
        let record = sample_record();
        let json = serde_json::to_string(&record.to_journal()).unwrap();
        let back: JournalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, SwapStatus::Initialized);
        assert_eq!(back.htlc_alt.timelock, 1_700_003_600);
    }
}
