//! Validator set derivation.
//!
//! Voting power is gathered from every configured provider through the
//! [`VotingPowerRouter`], merged with the key registry, filtered by the
//! network's inclusion policy and returned as a canonical, deterministic
//! [`ValidatorSet`](relay_types::ValidatorSet) with scheduler roles filled in.

pub mod client;
pub mod deriver;
pub mod quorum;
pub mod router;

pub use client::{ClientError, ClientResult, EvmClient, ExternalVotingPowerClient};
pub use deriver::{build_validator_set, ValidatorSetDeriver};
pub use quorum::{calc_quorum_threshold, quorum_threshold_for};
pub use router::{ProviderVotingPowers, VotingPowerRouter, MAX_EXTERNAL_CONCURRENCY};

use relay_scheduler::SchedulerError;
use relay_types::{Address, CrossChainAddress, Epoch, KeyTag};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValsetError {
    #[error("Failed to get current epoch: {0}")]
    CurrentEpoch(#[source] ClientError),

    #[error("Failed to get start of epoch {epoch}: {source}")]
    EpochStart { epoch: Epoch, source: ClientError },

    #[error("Failed to get network config for epoch {epoch}: {source}")]
    NetworkConfig { epoch: Epoch, source: ClientError },

    #[error("Voting power provider {provider} failed: {source}")]
    Provider {
        provider: CrossChainAddress,
        source: ClientError,
    },

    #[error("Key registry {registry} failed: {source}")]
    KeyRegistry {
        registry: CrossChainAddress,
        source: ClientError,
    },

    #[error("No external voting power client configured for provider {provider}")]
    ExternalClientMissing { provider: CrossChainAddress },

    #[error("Quorum threshold is zero for key tag {key_tag}")]
    ZeroQuorumThreshold { key_tag: KeyTag },

    #[error("Voting power of operator {operator} overflows 256 bits")]
    VotingPowerOverflow { operator: Address },

    #[error("Total active voting power of epoch {epoch} overflows 256 bits")]
    TotalVotingPowerOverflow { epoch: Epoch },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

pub type Result<T> = std::result::Result<T, ValsetError>;
