//! Deterministic off-chain role assignment for a validator set.
//!
//! Every node derives the same aggregator and committer indices from the
//! validator set header hash, and the same committer rotation from the
//! epoch capture timestamp.

pub mod committer;
pub mod roles;

pub use committer::{active_committer_at, is_active_committer};
pub use roles::{
    assign_roles, find_next_available_index, role_start_index, select_indices, SchedulerInfo,
    AGGREGATOR_DOMAIN, COMMITTER_DOMAIN,
};

use relay_types::TypesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidValidatorSet(#[from] TypesError),

    #[error("Requested {requested} {role}s but only {available} validators exist")]
    TooManyRoles {
        role: &'static str,
        requested: u64,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
