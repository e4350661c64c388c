use crate::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain ids at or above this value denote external (off-chain) voting
/// power providers rather than contracts on an EVM chain.
pub const EXTERNAL_CHAIN_ID_THRESHOLD: u64 = 4_000_000_000;

/// A contract or provider living on a specific chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainAddress {
    pub chain_id: u64,
    pub address: Address,
}

impl CrossChainAddress {
    pub fn new(chain_id: u64, address: Address) -> Self {
        Self { chain_id, address }
    }

    /// Whether queries for this provider go to the external voting power client.
    pub fn is_external(&self) -> bool {
        self.chain_id >= EXTERNAL_CHAIN_ID_THRESHOLD
    }
}

impl fmt::Display for CrossChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}", self.chain_id, self.address)
    }
}
