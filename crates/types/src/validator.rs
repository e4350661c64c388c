use crate::merkle::merkle_root;
use crate::{keccak256_concat, Address, KeyTag, UintExt, ValidatorKey, H256, U256};
use serde::{Deserialize, Serialize};

/// Maximum number of validators kept in one validator set.
pub const VALIDATOR_LIST_LIMIT: usize = 1024;

/// Maximum number of vaults kept per validator.
pub const VAULT_LIST_LIMIT: usize = 1024;

/// A vault's contribution to its operator's voting power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub chain_id: u64,
    pub vault: Address,
    pub voting_power: U256,
}

impl Vault {
    fn leaf_hash(&self) -> H256 {
        keccak256_concat(&[
            &self.chain_id.to_word(),
            &self.vault.to_word(),
            &self.voting_power.to_word(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    pub operator: Address,
    pub voting_power: U256,
    pub is_active: bool,
    pub keys: Vec<ValidatorKey>,
    pub vaults: Vec<Vault>,
}

impl Validator {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            voting_power: U256::zero(),
            is_active: false,
            keys: Vec::new(),
            vaults: Vec::new(),
        }
    }

    pub fn find_key(&self, tag: KeyTag) -> Option<&ValidatorKey> {
        self.keys.iter().find(|k| k.tag == tag)
    }

    /// Merkle leaf committing to every field of the validator.
    pub fn leaf_hash(&self) -> H256 {
        let mut keys: Vec<&ValidatorKey> = self.keys.iter().collect();
        keys.sort_by_key(|k| k.tag);
        let key_leaves: Vec<H256> = keys
            .iter()
            .map(|k| keccak256_concat(&[&[k.tag.0], &k.payload]))
            .collect();
        let vault_leaves: Vec<H256> = self.vaults.iter().map(Vault::leaf_hash).collect();

        keccak256_concat(&[
            &self.operator.to_word(),
            &self.voting_power.to_word(),
            &(self.is_active as u64).to_word(),
            merkle_root(&key_leaves).as_bytes(),
            merkle_root(&vault_leaves).as_bytes(),
        ])
    }
}

/// Voting power one vault holds for an operator, as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultVotingPower {
    pub vault: Address,
    pub voting_power: U256,
}

/// Provider response entry: one operator and its vault breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorVotingPower {
    pub operator: Address,
    pub vaults: Vec<VaultVotingPower>,
}

/// Key registry response entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorWithKeys {
    pub operator: Address,
    pub keys: Vec<ValidatorKey>,
}
