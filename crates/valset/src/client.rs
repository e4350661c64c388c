use async_trait::async_trait;
use relay_types::{CrossChainAddress, Epoch, NetworkConfig, OperatorVotingPower, OperatorWithKeys};
use std::future::Future;
use std::time::Duration;

/// Error type returned by chain and provider collaborators.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Read access to the settlement chain and to contracts on EVM chains.
#[async_trait]
pub trait EvmClient: Send + Sync {
    async fn get_current_epoch(&self) -> ClientResult<Epoch>;

    async fn get_epoch_start(&self, epoch: Epoch) -> ClientResult<u64>;

    async fn get_config(&self, timestamp: u64, epoch: Epoch) -> ClientResult<NetworkConfig>;

    async fn get_voting_powers(
        &self,
        provider: &CrossChainAddress,
        timestamp: u64,
    ) -> ClientResult<Vec<OperatorVotingPower>>;

    async fn get_keys(
        &self,
        registry: &CrossChainAddress,
        timestamp: u64,
    ) -> ClientResult<Vec<OperatorWithKeys>>;
}

/// Voting power source for providers living outside EVM chains.
#[async_trait]
pub trait ExternalVotingPowerClient: Send + Sync {
    async fn get_voting_powers(
        &self,
        provider: &CrossChainAddress,
        timestamp: u64,
    ) -> ClientResult<Vec<OperatorVotingPower>>;
}

/// Runs a collaborator call, turning an elapsed deadline into a client error.
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, call: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|elapsed| Box::new(elapsed) as ClientError)?,
        None => call.await,
    }
}
