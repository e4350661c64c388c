use relay_scheduler::assign_roles;
use relay_types::{
    Address, CrossChainAddress, Epoch, NetworkConfig, OperatorWithKeys, Validator, ValidatorSet,
    ValidatorSetStatus, Vault, U256, VALIDATOR_LIST_LIMIT, VALIDATOR_SET_VERSION, VAULT_LIST_LIMIT,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::{with_timeout, EvmClient, ExternalVotingPowerClient};
use crate::quorum::quorum_threshold_for;
use crate::router::{ProviderVotingPowers, VotingPowerRouter};
use crate::{Result, ValsetError};

/// Builds validator sets from on-chain voting power and key data.
pub struct ValidatorSetDeriver {
    evm: Arc<dyn EvmClient>,
    router: VotingPowerRouter,
    query_timeout: Option<Duration>,
}

impl ValidatorSetDeriver {
    pub fn new(evm: Arc<dyn EvmClient>) -> Self {
        Self {
            router: VotingPowerRouter::new(evm.clone()),
            evm,
            query_timeout: None,
        }
    }

    pub fn with_external_client(mut self, client: Arc<dyn ExternalVotingPowerClient>) -> Self {
        self.router = self.router.with_external(client);
        self
    }

    pub fn with_max_external_concurrency(mut self, max_concurrent: usize) -> Self {
        self.router = self.router.with_max_external_concurrency(max_concurrent);
        self
    }

    /// Deadline applied to every individual collaborator call.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self.router = self.router.with_query_timeout(timeout);
        self
    }

    pub async fn current_epoch(&self) -> Result<Epoch> {
        with_timeout(self.query_timeout, self.evm.get_current_epoch())
            .await
            .map_err(ValsetError::CurrentEpoch)
    }

    pub async fn epoch_start(&self, epoch: Epoch) -> Result<u64> {
        with_timeout(self.query_timeout, self.evm.get_epoch_start(epoch))
            .await
            .map_err(|source| ValsetError::EpochStart { epoch, source })
    }

    /// Network configuration in force for `epoch`.
    pub async fn network_config(&self, epoch: Epoch) -> Result<NetworkConfig> {
        let timestamp = self.epoch_start(epoch).await?;
        with_timeout(self.query_timeout, self.evm.get_config(timestamp, epoch))
            .await
            .map_err(|source| ValsetError::NetworkConfig { epoch, source })
    }

    /// Derives the validator set of the chain's current epoch.
    pub async fn derive_current(&self) -> Result<(NetworkConfig, ValidatorSet)> {
        let epoch = self.current_epoch().await?;
        let config = self.network_config(epoch).await?;
        let set = self.derive_validator_set(epoch, &config).await?;
        Ok((config, set))
    }

    /// Derives the validator set of `epoch` under `config`.
    ///
    /// Nothing is returned unless every provider and the key registry
    /// answered; the first failure aborts the derivation.
    pub async fn derive_validator_set(
        &self,
        epoch: Epoch,
        config: &NetworkConfig,
    ) -> Result<ValidatorSet> {
        let capture_timestamp = self.epoch_start(epoch).await?;
        info!(
            epoch,
            capture_timestamp,
            providers = config.voting_power_providers.len(),
            "Deriving validator set"
        );

        let (voting_powers, keys) = tokio::try_join!(
            self.router
                .get_all_voting_powers(&config.voting_power_providers, capture_timestamp),
            self.get_keys(&config.keys_provider, capture_timestamp),
        )?;

        let set = build_validator_set(epoch, capture_timestamp, config, &voting_powers, &keys)?;
        info!(
            epoch,
            validators = set.validators.len(),
            active = set.total_active_validators(),
            total_voting_power = %set.total_active_voting_power(),
            quorum_threshold = %set.quorum_threshold,
            "Derived validator set"
        );
        Ok(set)
    }

    async fn get_keys(
        &self,
        registry: &CrossChainAddress,
        timestamp: u64,
    ) -> Result<Vec<OperatorWithKeys>> {
        with_timeout(self.query_timeout, self.evm.get_keys(registry, timestamp))
            .await
            .map_err(|source| ValsetError::KeyRegistry {
                registry: *registry,
                source,
            })
    }
}

/// Pure part of the derivation: merge, truncate, activate, order, compute
/// the threshold and assign roles. Identical inputs give identical output
/// regardless of the order providers answered in.
pub fn build_validator_set(
    epoch: Epoch,
    capture_timestamp: u64,
    config: &NetworkConfig,
    voting_powers: &[ProviderVotingPowers],
    keys: &[OperatorWithKeys],
) -> Result<ValidatorSet> {
    let mut validators = merge_validators(voting_powers, keys);
    for validator in validators.iter_mut() {
        truncate_vaults(validator)?;
    }

    mark_active(&mut validators, config);
    truncate_validators(&mut validators);
    validators.sort_by(|a, b| a.operator.cmp(&b.operator));

    let total_active = validators
        .iter()
        .filter(|v| v.is_active)
        .try_fold(U256::zero(), |acc, v| acc.checked_add(v.voting_power))
        .ok_or(ValsetError::TotalVotingPowerOverflow { epoch })?;
    let quorum_threshold = quorum_threshold_for(config, total_active)?;

    let mut set = ValidatorSet {
        version: VALIDATOR_SET_VERSION,
        required_key_tag: config.required_header_key_tag,
        epoch,
        capture_timestamp,
        quorum_threshold,
        validators,
        status: ValidatorSetStatus::Derived,
        aggregator_indices: Vec::new(),
        committer_indices: Vec::new(),
    };

    let roles = assign_roles(&set, config)?;
    set.aggregator_indices = roles.aggregator_indices;
    set.committer_indices = roles.committer_indices;

    Ok(set)
}

/// One validator per operator seen in voting power data. Keys of operators
/// without voting power are ignored; the first key per tag wins.
fn merge_validators(
    voting_powers: &[ProviderVotingPowers],
    keys: &[OperatorWithKeys],
) -> Vec<Validator> {
    let mut by_operator: BTreeMap<Address, Validator> = BTreeMap::new();

    for response in voting_powers {
        for entry in &response.operators {
            let validator = by_operator
                .entry(entry.operator)
                .or_insert_with(|| Validator::new(entry.operator));
            for vault in &entry.vaults {
                validator.vaults.push(Vault {
                    chain_id: response.provider.chain_id,
                    vault: vault.vault,
                    voting_power: vault.voting_power,
                });
            }
        }
    }

    for entry in keys {
        let Some(validator) = by_operator.get_mut(&entry.operator) else {
            continue;
        };
        for key in &entry.keys {
            if validator.find_key(key.tag).is_none() {
                validator.keys.push(key.clone());
            }
        }
        validator.keys.sort_by_key(|k| k.tag);
    }

    by_operator.into_values().collect()
}

fn by_power_then_operator(a: &Validator, b: &Validator) -> Ordering {
    b.voting_power
        .cmp(&a.voting_power)
        .then_with(|| a.operator.cmp(&b.operator))
}

/// Keeps the strongest `VAULT_LIST_LIMIT` vaults, recomputes the voting
/// power from them and leaves them ordered by address.
fn truncate_vaults(validator: &mut Validator) -> Result<()> {
    validator.vaults.sort_by(|a, b| {
        b.voting_power
            .cmp(&a.voting_power)
            .then_with(|| a.vault.cmp(&b.vault))
            .then_with(|| a.chain_id.cmp(&b.chain_id))
    });
    validator.vaults.truncate(VAULT_LIST_LIMIT);
    validator.voting_power = validator
        .vaults
        .iter()
        .try_fold(U256::zero(), |acc, v| acc.checked_add(v.voting_power))
        .ok_or(ValsetError::VotingPowerOverflow {
            operator: validator.operator,
        })?;
    validator
        .vaults
        .sort_by(|a, b| a.vault.cmp(&b.vault).then_with(|| a.chain_id.cmp(&b.chain_id)));
    Ok(())
}

/// Single pass in descending power order. The scan stops at the first
/// validator under the inclusion minimum: everything after it is smaller.
fn mark_active(validators: &mut [Validator], config: &NetworkConfig) {
    validators.sort_by(by_power_then_operator);

    let mut activated = 0u64;
    for validator in validators.iter_mut() {
        if validator.voting_power < config.min_inclusion_voting_power {
            break;
        }
        if validator.keys.is_empty() {
            continue;
        }

        validator.is_active = true;
        activated += 1;
        if !config.max_voting_power.is_zero() && validator.voting_power > config.max_voting_power {
            debug!(operator = %validator.operator, "Capping voting power");
            validator.voting_power = config.max_voting_power;
        }

        if config.max_validators_count > 0 && activated >= config.max_validators_count {
            break;
        }
    }
}

fn truncate_validators(validators: &mut Vec<Validator>) {
    validators.sort_by(by_power_then_operator);
    validators.truncate(VALIDATOR_LIST_LIMIT);
}
