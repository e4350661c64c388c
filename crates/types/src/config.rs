use crate::{CrossChainAddress, KeyTag, U256};
use serde::{Deserialize, Serialize};

/// Aggregation proof flavour the settlement contracts expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationType {
    #[default]
    BlsBn254Simple,
    BlsBn254Zk,
}

/// Quorum percentage required for signatures made with one key tag,
/// as an 18-decimal fixed point value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuorumThreshold {
    pub key_tag: KeyTag,
    pub quorum_threshold: U256,
}

/// Per-epoch network configuration read from the settlement chain.
/// Immutable once read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    pub voting_power_providers: Vec<CrossChainAddress>,
    pub keys_provider: CrossChainAddress,
    pub settlements: Vec<CrossChainAddress>,
    pub verification_type: VerificationType,
    /// Cap applied to an active validator's voting power. Zero disables it.
    pub max_voting_power: U256,
    pub min_inclusion_voting_power: U256,
    /// Zero means unlimited.
    pub max_validators_count: u64,
    pub required_key_tags: Vec<KeyTag>,
    pub required_header_key_tag: KeyTag,
    pub quorum_thresholds: Vec<QuorumThreshold>,
    pub num_aggregators: u64,
    pub num_committers: u64,
    /// Seconds per committer slot. Zero disables rotation.
    pub committer_slot_duration: u64,
}

impl NetworkConfig {
    /// Quorum percentage configured for `tag`, if any.
    pub fn quorum_percent_for(&self, tag: KeyTag) -> Option<U256> {
        self.quorum_thresholds
            .iter()
            .find(|q| q.key_tag == tag)
            .map(|q| q.quorum_threshold)
    }
}
