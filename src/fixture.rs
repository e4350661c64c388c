//! Static chain collaborator backed by a JSON description.
//!
//! Epoch `n` starts at `genesis_timestamp + n * epoch_duration`. Voting
//! powers and keys do not change over time; every epoch sees the same
//! network configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_types::{
    CrossChainAddress, Epoch, NetworkConfig, OperatorVotingPower, OperatorWithKeys,
};
use relay_valset::{ClientError, ClientResult, EvmClient, ExternalVotingPowerClient};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFixture {
    pub provider: CrossChainAddress,
    pub operators: Vec<OperatorVotingPower>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub current_epoch: Epoch,
    pub genesis_timestamp: u64,
    pub epoch_duration: u64,
    pub config: NetworkConfig,
    #[serde(default)]
    pub voting_powers: Vec<ProviderFixture>,
    #[serde(default)]
    pub keys: Vec<OperatorWithKeys>,
}

/// Serves both EVM and external voting power queries from a [`Fixture`].
#[derive(Debug, Clone)]
pub struct FixtureClient {
    fixture: Fixture,
}

impl FixtureClient {
    pub fn new(fixture: Fixture) -> Self {
        Self { fixture }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let fixture = serde_json::from_str(json).context("Failed to parse fixture")?;
        Ok(Self::new(fixture))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    fn epoch_start(&self, epoch: Epoch) -> ClientResult<u64> {
        if epoch > self.fixture.current_epoch {
            return Err(format!(
                "epoch {epoch} has not started (current epoch {})",
                self.fixture.current_epoch
            )
            .into());
        }
        epoch
            .checked_mul(self.fixture.epoch_duration)
            .and_then(|offset| offset.checked_add(self.fixture.genesis_timestamp))
            .ok_or_else(|| ClientError::from(format!("start of epoch {epoch} overflows")))
    }

    fn voting_powers(&self, provider: &CrossChainAddress) -> ClientResult<Vec<OperatorVotingPower>> {
        self.fixture
            .voting_powers
            .iter()
            .find(|p| p.provider == *provider)
            .map(|p| p.operators.clone())
            .ok_or_else(|| format!("unknown voting power provider {provider}").into())
    }
}

#[async_trait]
impl EvmClient for FixtureClient {
    async fn get_current_epoch(&self) -> ClientResult<Epoch> {
        Ok(self.fixture.current_epoch)
    }

    async fn get_epoch_start(&self, epoch: Epoch) -> ClientResult<u64> {
        self.epoch_start(epoch)
    }

    async fn get_config(&self, timestamp: u64, epoch: Epoch) -> ClientResult<NetworkConfig> {
        if timestamp < self.fixture.genesis_timestamp {
            return Err(format!("no configuration before genesis (epoch {epoch})").into());
        }
        Ok(self.fixture.config.clone())
    }

    async fn get_voting_powers(
        &self,
        provider: &CrossChainAddress,
        _timestamp: u64,
    ) -> ClientResult<Vec<OperatorVotingPower>> {
        self.voting_powers(provider)
    }

    async fn get_keys(
        &self,
        registry: &CrossChainAddress,
        _timestamp: u64,
    ) -> ClientResult<Vec<OperatorWithKeys>> {
        if *registry != self.fixture.config.keys_provider {
            return Err(format!("unknown key registry {registry}").into());
        }
        Ok(self.fixture.keys.clone())
    }
}

#[async_trait]
impl ExternalVotingPowerClient for FixtureClient {
    async fn get_voting_powers(
        &self,
        provider: &CrossChainAddress,
        _timestamp: u64,
    ) -> ClientResult<Vec<OperatorVotingPower>> {
        self.voting_powers(provider)
    }
}
