pub mod address;
pub mod bitmap;
pub mod chain;
pub mod config;
pub mod hash;
pub mod header;
pub mod key;
pub mod merkle;
pub mod serde_hex;
pub mod uint;
pub mod validator;
pub mod validator_set;

pub use address::Address;
pub use bitmap::Bitmap;
pub use chain::{CrossChainAddress, EXTERNAL_CHAIN_ID_THRESHOLD};
pub use config::{NetworkConfig, QuorumThreshold, VerificationType};
pub use hash::{keccak256, keccak256_concat, H160, H256};
pub use header::ValidatorSetHeader;
pub use key::{KeyTag, KeyType, ValidatorKey};
pub use uint::{UintExt, U256, U512};
pub use validator::{
    OperatorVotingPower, OperatorWithKeys, Validator, Vault, VaultVotingPower,
    VALIDATOR_LIST_LIMIT, VAULT_LIST_LIMIT,
};
pub use validator_set::{ValidatorProof, ValidatorSet, ValidatorSetStatus, VALIDATOR_SET_VERSION};

use thiserror::Error;

/// Epoch number of a validator set generation.
pub type Epoch = u64;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid address checksum")]
    InvalidChecksum,

    #[error("Validators are not sorted by operator address (position {position})")]
    UnsortedValidators { position: usize },
}

pub type Result<T> = std::result::Result<T, TypesError>;
