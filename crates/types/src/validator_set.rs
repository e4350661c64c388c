use crate::merkle::{merkle_proof, merkle_root};
use crate::{
    Address, Epoch, KeyTag, Result, TypesError, Validator, ValidatorSetHeader, H256, U256,
};
use serde::{Deserialize, Serialize};

/// Header version produced by this implementation.
pub const VALIDATOR_SET_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidatorSetStatus {
    #[default]
    Derived,
    Aggregated,
    Committed,
    Missing,
}

/// Canonical validator list for an epoch.
///
/// `validators` is sorted by operator address ascending. The role indices
/// are off-chain annotations and are not part of the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSet {
    pub version: u8,
    pub required_key_tag: KeyTag,
    pub epoch: Epoch,
    pub capture_timestamp: u64,
    pub quorum_threshold: U256,
    pub validators: Vec<Validator>,
    pub status: ValidatorSetStatus,
    pub aggregator_indices: Vec<u32>,
    pub committer_indices: Vec<u32>,
}

/// Inclusion proof of one validator against the header's validators root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorProof {
    pub leaf: H256,
    pub index: usize,
    pub proof: Vec<H256>,
}

impl ValidatorSet {
    pub fn is_sorted(&self) -> bool {
        self.validators
            .windows(2)
            .all(|pair| pair[0].operator < pair[1].operator)
    }

    /// Fails when `validators` is not strictly ascending by operator.
    pub fn ensure_sorted(&self) -> Result<()> {
        match self
            .validators
            .windows(2)
            .position(|pair| pair[0].operator >= pair[1].operator)
        {
            Some(position) => Err(TypesError::UnsortedValidators {
                position: position + 1,
            }),
            None => Ok(()),
        }
    }

    pub fn active_validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter().filter(|v| v.is_active)
    }

    pub fn total_active_validators(&self) -> usize {
        self.active_validators().count()
    }

    /// Sum of active voting power, saturating at `U256::MAX`. Derived sets
    /// never saturate: derivation rejects a total that does not fit.
    pub fn total_active_voting_power(&self) -> U256 {
        self.checked_total_active_voting_power().unwrap_or(U256::MAX)
    }

    pub fn checked_total_active_voting_power(&self) -> Option<U256> {
        self.active_validators()
            .try_fold(U256::zero(), |acc, v| acc.checked_add(v.voting_power))
    }

    pub fn find_validator_by_operator(&self, operator: &Address) -> Option<&Validator> {
        self.validators
            .binary_search_by(|v| v.operator.cmp(operator))
            .ok()
            .map(|i| &self.validators[i])
    }

    /// Position of the validator holding `payload` under `tag`.
    pub fn find_validator_by_key(&self, tag: KeyTag, payload: &[u8]) -> Option<usize> {
        self.validators.iter().position(|v| {
            v.find_key(tag)
                .map(|k| k.payload.as_slice() == payload)
                .unwrap_or(false)
        })
    }

    /// Index of `operator` among the active validators. This is the index
    /// space signature bitmaps are built over.
    pub fn active_index_of(&self, operator: &Address) -> Option<u32> {
        self.active_validators()
            .position(|v| v.operator == *operator)
            .map(|i| i as u32)
    }

    pub fn validator_at_active_index(&self, index: u32) -> Option<&Validator> {
        self.active_validators().nth(index as usize)
    }

    pub fn is_aggregator(&self, key: &[u8]) -> bool {
        self.find_validator_by_key(self.required_key_tag, key)
            .map(|i| self.aggregator_indices.contains(&(i as u32)))
            .unwrap_or(false)
    }

    pub fn is_committer(&self, key: &[u8]) -> bool {
        self.committer_position(key).is_some()
    }

    /// Validator index of the committer holding `key`, if it is one.
    pub fn committer_position(&self, key: &[u8]) -> Option<u32> {
        let index = self.find_validator_by_key(self.required_key_tag, key)? as u32;
        self.committer_indices.contains(&index).then_some(index)
    }

    fn leaves(&self) -> Vec<H256> {
        self.validators.iter().map(Validator::leaf_hash).collect()
    }

    pub fn validators_root(&self) -> H256 {
        merkle_root(&self.leaves())
    }

    /// Merkleizes the validator list and builds the hashable header.
    pub fn header(&self) -> ValidatorSetHeader {
        ValidatorSetHeader {
            version: self.version,
            required_key_tag: self.required_key_tag,
            epoch: self.epoch,
            capture_timestamp: self.capture_timestamp,
            quorum_threshold: self.quorum_threshold,
            total_voting_power: self.total_active_voting_power(),
            validators_root: self.validators_root(),
        }
    }

    pub fn validator_proof(&self, operator: &Address) -> Option<ValidatorProof> {
        let index = self
            .validators
            .binary_search_by(|v| v.operator.cmp(operator))
            .ok()?;
        let leaves = self.leaves();
        let proof = merkle_proof(&leaves, index)?;
        Some(ValidatorProof {
            leaf: leaves[index],
            index,
            proof,
        })
    }
}
