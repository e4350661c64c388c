//! Peer resync of signatures and aggregation proofs.
//!
//! A node that misses signatures asks peers for exactly the validator
//! indices it lacks, per signing request. Proofs are asked for by request id.
//! Applying a response never trusts the peer: entries that were not asked
//! for are counted and skipped, and every signature goes through the
//! caller's verifier before it reaches the tracker.

use relay_types::{serde_hex, Bitmap, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::proof::AggregationProof;
use crate::tracker::{SignatureOutcome, SignatureTracker};
use crate::AggregationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantSignaturesRequest {
    pub wants: BTreeMap<H256, Bitmap>,
}

impl WantSignaturesRequest {
    /// Missing signers of every request that has not reached quorum.
    pub fn from_tracker(tracker: &SignatureTracker) -> Self {
        Self {
            wants: tracker
                .pending()
                .into_iter()
                .filter(|(_, missing)| !missing.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wants.is_empty()
    }

    fn wants(&self, request_id: &H256, index: u32) -> bool {
        self.wants
            .get(request_id)
            .map(|missing| missing.contains(index))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedSignature {
    pub validator_index: u32,
    #[serde(with = "serde_hex")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantSignaturesResponse {
    pub signatures: BTreeMap<H256, Vec<IndexedSignature>>,
}

impl WantSignaturesResponse {
    /// Answers `request` from locally known signatures.
    pub fn answer<F>(request: &WantSignaturesRequest, mut lookup: F) -> Self
    where
        F: FnMut(&H256, u32) -> Option<Vec<u8>>,
    {
        let mut signatures = BTreeMap::new();
        for (request_id, missing) in &request.wants {
            let found: Vec<_> = missing
                .iter()
                .filter_map(|index| {
                    lookup(request_id, index).map(|signature| IndexedSignature {
                        validator_index: index,
                        signature,
                    })
                })
                .collect();
            if !found.is_empty() {
                signatures.insert(*request_id, found);
            }
        }
        Self { signatures }
    }
}

/// Per-attempt counters of a signature resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureSyncStats {
    pub processed: usize,
    pub unrequested: usize,
    pub already_present: usize,
    pub verification_failed: usize,
}

/// A resynced signature that made it into the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSignature {
    pub request_id: H256,
    pub signature: IndexedSignature,
    pub outcome: SignatureOutcome,
}

/// Feeds a peer's answer into `tracker`.
///
/// `voting_power` resolves a validator index of a request to its voting
/// power; an index it cannot resolve counts as a failed verification, as
/// does a signature rejected by `verify`. Returns the accepted signatures
/// in the order they were applied.
pub fn apply_signatures_response<P, V>(
    tracker: &SignatureTracker,
    request: &WantSignaturesRequest,
    response: &WantSignaturesResponse,
    mut voting_power: P,
    mut verify: V,
) -> (Vec<AcceptedSignature>, SignatureSyncStats)
where
    P: FnMut(&H256, u32) -> Option<U256>,
    V: FnMut(&H256, &IndexedSignature) -> bool,
{
    let mut stats = SignatureSyncStats::default();
    let mut accepted = Vec::new();

    for (request_id, signatures) in &response.signatures {
        for signature in signatures {
            let index = signature.validator_index;
            if !request.wants(request_id, index) {
                stats.unrequested += 1;
                continue;
            }
            if tracker.has_signature(request_id, index) {
                stats.already_present += 1;
                continue;
            }
            let power = match voting_power(request_id, index) {
                Some(power) if verify(request_id, signature) => power,
                _ => {
                    stats.verification_failed += 1;
                    continue;
                }
            };

            match tracker.add_signature(*request_id, index, power) {
                Ok(outcome) => {
                    stats.processed += 1;
                    accepted.push(AcceptedSignature {
                        request_id: *request_id,
                        signature: signature.clone(),
                        outcome,
                    });
                }
                Err(AggregationError::AlreadyExists { .. }) => stats.already_present += 1,
                Err(AggregationError::UnknownRequest { .. }) => stats.unrequested += 1,
                Err(
                    AggregationError::IndexOutOfRange { .. }
                    | AggregationError::VotingPowerOverflow { .. },
                ) => stats.verification_failed += 1,
            }
        }
    }

    debug!(?stats, "Applied signature resync response");
    (accepted, stats)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WantProofsRequest {
    pub request_ids: BTreeSet<H256>,
}

impl WantProofsRequest {
    /// Every request the tracker still waits on a proof for.
    pub fn from_tracker(tracker: &SignatureTracker) -> Self {
        Self {
            request_ids: tracker.request_ids().into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantProofsResponse {
    pub proofs: BTreeMap<H256, AggregationProof>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProofSyncStats {
    pub processed: usize,
    pub unrequested: usize,
    pub already_present: usize,
}

/// Accepts requested proofs, finalizing their requests in `tracker`.
/// Returns the accepted proofs in request id order.
pub fn apply_proofs_response(
    tracker: &SignatureTracker,
    request: &WantProofsRequest,
    response: &WantProofsResponse,
) -> (Vec<AggregationProof>, ProofSyncStats) {
    let mut stats = ProofSyncStats::default();
    let mut accepted = Vec::new();

    for (request_id, proof) in &response.proofs {
        if !request.request_ids.contains(request_id) || proof.request_id != *request_id {
            stats.unrequested += 1;
            continue;
        }
        if tracker.finalize(request_id).is_none() {
            stats.already_present += 1;
            continue;
        }
        stats.processed += 1;
        accepted.push(proof.clone());
    }

    debug!(?stats, "Applied proof resync response");
    (accepted, stats)
}
