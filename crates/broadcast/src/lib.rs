//! Fan-out of relay events to live subscribers.
//!
//! A [`Hub`] knows nothing about what it carries; the relay runs one hub per
//! event kind (signatures, aggregation proofs, validator sets).

pub mod hub;

pub use hub::{Hub, Subscription, DEFAULT_BUFFER_SIZE};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Subscriber limit of {limit} reached")]
    ResourceExhausted { limit: usize },
}

pub type Result<T> = std::result::Result<T, HubError>;
