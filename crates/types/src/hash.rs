use primitive_types::{H160 as PrimitiveH160, H256 as PrimitiveH256};
use sha3::{Digest, Keccak256};

pub type H160 = PrimitiveH160;
pub type H256 = PrimitiveH256;

/// Compute the Keccak-256 hash of the input data
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Compute the Keccak-256 hash of multiple slices of data
pub fn keccak256_concat(data: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for slice in data {
        hasher.update(slice);
    }
    H256::from_slice(&hasher.finalize())
}
