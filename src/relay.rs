use parking_lot::RwLock;
use relay_aggregation::{
    apply_proofs_response, apply_signatures_response, AggregationError, AggregationProof,
    IndexedSignature, ProofSyncStats, SignatureOutcome, SignatureSyncStats, SignatureTracker,
    WantProofsRequest, WantProofsResponse, WantSignaturesRequest, WantSignaturesResponse,
};
use relay_broadcast::Hub;
use relay_types::{serde_hex, Address, Epoch, NetworkConfig, ValidatorSet, H256};
use relay_valset::{EvmClient, ExternalVotingPowerClient, ValidatorSetDeriver, ValsetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{BroadcastConfig, RelayConfig};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Valset(#[from] ValsetError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Operator {operator} is not an active validator in epoch {epoch}")]
    NotActive { epoch: Epoch, operator: Address },

    #[error("Signing request {request_id:?} belongs to epoch {tracked}, not {epoch}")]
    EpochMismatch {
        request_id: H256,
        tracked: Epoch,
        epoch: Epoch,
    },
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// A validator's signature accepted for a signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEvent {
    pub request_id: H256,
    pub epoch: Epoch,
    pub validator_index: u32,
    pub operator: Address,
    #[serde(with = "serde_hex")]
    pub signature: Vec<u8>,
}

/// Result of applying a peer's signature resync answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureResync {
    pub stats: SignatureSyncStats,
    /// Requests whose quorum was crossed by a resynced signature.
    pub newly_reached: Vec<H256>,
}

fn hub<T>(config: &BroadcastConfig) -> Hub<T> {
    Hub::with_limit(config.buffer_size, config.max_subscribers)
}

struct EpochEntry {
    config: Arc<NetworkConfig>,
    set: Arc<ValidatorSet>,
}

/// Ties derivation, quorum tracking and the three event hubs together.
pub struct Relay {
    deriver: ValidatorSetDeriver,
    tracker: SignatureTracker,
    signatures: Hub<SignatureEvent>,
    proofs: Hub<AggregationProof>,
    validator_sets: Hub<Arc<ValidatorSet>>,
    epochs: RwLock<BTreeMap<Epoch, EpochEntry>>,
    cache_epochs: usize,
    retain_epochs: u64,
    grace_period_secs: u64,
}

impl Relay {
    pub fn new(evm: Arc<dyn EvmClient>, config: &RelayConfig) -> Self {
        let deriver = ValidatorSetDeriver::new(evm)
            .with_query_timeout(config.deriver.query_timeout())
            .with_max_external_concurrency(config.deriver.max_external_concurrency);
        Self {
            deriver,
            tracker: SignatureTracker::new(),
            signatures: hub(&config.broadcast),
            proofs: hub(&config.broadcast),
            validator_sets: hub(&config.broadcast),
            epochs: RwLock::new(BTreeMap::new()),
            cache_epochs: config.deriver.cache_epochs.max(1),
            retain_epochs: config.aggregation.retain_epochs,
            grace_period_secs: config.scheduler.grace_period_secs,
        }
    }

    pub fn with_external_client(mut self, client: Arc<dyn ExternalVotingPowerClient>) -> Self {
        self.deriver = self.deriver.with_external_client(client);
        self
    }

    pub fn signatures(&self) -> &Hub<SignatureEvent> {
        &self.signatures
    }

    pub fn proofs(&self) -> &Hub<AggregationProof> {
        &self.proofs
    }

    pub fn validator_sets(&self) -> &Hub<Arc<ValidatorSet>> {
        &self.validator_sets
    }

    pub fn tracker(&self) -> &SignatureTracker {
        &self.tracker
    }

    pub async fn current_epoch(&self) -> Result<Epoch> {
        Ok(self.deriver.current_epoch().await?)
    }

    /// Validator set of `epoch`, derived on first use and cached afterwards.
    /// A freshly derived set is published on the validator set hub.
    pub async fn validator_set(&self, epoch: Epoch) -> Result<Arc<ValidatorSet>> {
        Ok(self.epoch_entry(epoch).await?.1)
    }

    pub fn cached_validator_set(&self, epoch: Epoch) -> Option<Arc<ValidatorSet>> {
        self.epochs.read().get(&epoch).map(|e| e.set.clone())
    }

    async fn epoch_entry(&self, epoch: Epoch) -> Result<(Arc<NetworkConfig>, Arc<ValidatorSet>)> {
        if let Some(entry) = self.epochs.read().get(&epoch) {
            return Ok((entry.config.clone(), entry.set.clone()));
        }

        let config = self.deriver.network_config(epoch).await?;
        let set = self.deriver.derive_validator_set(epoch, &config).await?;
        let (config, set) = (Arc::new(config), Arc::new(set));

        {
            let mut epochs = self.epochs.write();
            if let Some(existing) = epochs.get(&epoch) {
                return Ok((existing.config.clone(), existing.set.clone()));
            }
            epochs.insert(
                epoch,
                EpochEntry {
                    config: config.clone(),
                    set: set.clone(),
                },
            );
            while epochs.len() > self.cache_epochs {
                epochs.pop_first();
            }
        }

        let subscribers = self.validator_sets.broadcast(set.clone());
        info!(epoch, subscribers, "Published validator set");
        Ok((config, set))
    }

    /// Opens quorum tracking for `request_id` against the active validators
    /// of `epoch`. Returns `false` when the request was already open.
    pub async fn begin_signing(&self, request_id: H256, epoch: Epoch) -> Result<bool> {
        let set = self.validator_set(epoch).await?;
        Ok(self.tracker.track(
            request_id,
            epoch,
            set.total_active_validators() as u32,
            set.quorum_threshold,
        ))
    }

    /// Counts `operator`'s signature towards `request_id` and publishes it.
    /// `epoch` must be the one the request was opened under.
    pub async fn record_signature(
        &self,
        request_id: H256,
        epoch: Epoch,
        operator: Address,
        signature: Vec<u8>,
    ) -> Result<SignatureOutcome> {
        let tracked = self
            .tracker
            .epoch_of(&request_id)
            .ok_or(AggregationError::UnknownRequest { request_id })?;
        if tracked != epoch {
            return Err(RelayError::EpochMismatch {
                request_id,
                tracked,
                epoch,
            });
        }

        let set = self.validator_set(epoch).await?;
        let (index, voting_power) = set
            .active_index_of(&operator)
            .and_then(|i| set.validator_at_active_index(i).map(|v| (i, v.voting_power)))
            .ok_or(RelayError::NotActive { epoch, operator })?;

        let outcome = self.tracker.add_signature(request_id, index, voting_power)?;
        self.signatures.broadcast(SignatureEvent {
            request_id,
            epoch,
            validator_index: index,
            operator,
            signature,
        });

        if outcome.newly_reached {
            info!(?request_id, epoch, voting_power = %outcome.current_voting_power, "Quorum reached");
        }
        Ok(outcome)
    }

    /// Closes the proof's signing request and publishes the proof. Returns
    /// whether the request was still being tracked.
    pub fn record_proof(&self, proof: AggregationProof) -> bool {
        let tracked = self.tracker.finalize(&proof.request_id).is_some();
        debug!(request_id = ?proof.request_id, tracked, "Recorded aggregation proof");
        self.proofs.broadcast(proof);
        tracked
    }

    /// Whether the committer holding `key` may submit the header of `epoch`
    /// at `now`.
    pub async fn is_active_committer(&self, epoch: Epoch, key: &[u8], now: u64) -> Result<bool> {
        let (config, set) = self.epoch_entry(epoch).await?;
        Ok(relay_scheduler::is_active_committer(
            &set,
            config.committer_slot_duration,
            now,
            self.grace_period_secs,
            key,
        ))
    }

    /// Signatures this node still misses, to be sent to peers.
    pub fn want_signatures(&self) -> WantSignaturesRequest {
        WantSignaturesRequest::from_tracker(&self.tracker)
    }

    /// Applies a peer's answer to [`Relay::want_signatures`] and publishes
    /// every accepted signature. Only epochs with a cached validator set can
    /// be credited.
    pub fn apply_signature_resync<V>(
        &self,
        request: &WantSignaturesRequest,
        response: &WantSignaturesResponse,
        verify: V,
    ) -> SignatureResync
    where
        V: FnMut(&H256, &IndexedSignature) -> bool,
    {
        let voting_power = |request_id: &H256, index: u32| {
            let epoch = self.tracker.epoch_of(request_id)?;
            let set = self.cached_validator_set(epoch)?;
            set.validator_at_active_index(index).map(|v| v.voting_power)
        };
        let (accepted, stats) =
            apply_signatures_response(&self.tracker, request, response, voting_power, verify);

        let mut newly_reached = Vec::new();
        for accepted in accepted {
            let request_id = accepted.request_id;
            let index = accepted.signature.validator_index;
            if accepted.outcome.newly_reached {
                info!(
                    ?request_id,
                    voting_power = %accepted.outcome.current_voting_power,
                    "Quorum reached through resync"
                );
                newly_reached.push(request_id);
            }

            // the request may have been finalized since it was credited
            let Some(epoch) = self.tracker.epoch_of(&request_id) else {
                continue;
            };
            let Some(operator) = self
                .cached_validator_set(epoch)
                .and_then(|set| set.validator_at_active_index(index).map(|v| v.operator))
            else {
                continue;
            };
            self.signatures.broadcast(SignatureEvent {
                request_id,
                epoch,
                validator_index: index,
                operator,
                signature: accepted.signature.signature,
            });
        }

        SignatureResync {
            stats,
            newly_reached,
        }
    }

    /// Signing requests this node still waits on a proof for.
    pub fn want_proofs(&self) -> WantProofsRequest {
        WantProofsRequest::from_tracker(&self.tracker)
    }

    /// Applies a peer's answer to [`Relay::want_proofs`], closing the
    /// matching requests and publishing the accepted proofs.
    pub fn apply_proof_resync(
        &self,
        request: &WantProofsRequest,
        response: &WantProofsResponse,
    ) -> ProofSyncStats {
        let (accepted, stats) = apply_proofs_response(&self.tracker, request, response);
        for proof in accepted {
            debug!(request_id = ?proof.request_id, "Resynced aggregation proof");
            self.proofs.broadcast(proof);
        }
        stats
    }

    /// Drops signing requests older than the retention window and returns
    /// how many were removed.
    pub fn prune(&self, current_epoch: Epoch) -> usize {
        self.tracker
            .prune_before(current_epoch.saturating_sub(self.retain_epochs))
    }

    /// Stops every subscriber of every hub.
    pub fn shutdown(&self) {
        self.signatures.close();
        self.proofs.close();
        self.validator_sets.close();
    }
}
