use crate::{keccak256, Epoch, KeyTag, UintExt, H256, U256};
use serde::{Deserialize, Serialize};

/// Size of the canonical header encoding: seven 32-byte words.
pub const HEADER_ENCODED_LEN: usize = 7 * 32;

/// Hashable summary of a validator set. Its hash seeds role assignment
/// and is the value committed on the settlement chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSetHeader {
    pub version: u8,
    pub required_key_tag: KeyTag,
    pub epoch: Epoch,
    pub capture_timestamp: u64,
    pub quorum_threshold: U256,
    pub total_voting_power: U256,
    pub validators_root: H256,
}

impl ValidatorSetHeader {
    /// ABI-style encoding: every field left-padded to a big-endian word,
    /// in declaration order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_ENCODED_LEN);
        out.extend_from_slice(&(self.version as u64).to_word());
        out.extend_from_slice(&(self.required_key_tag.0 as u64).to_word());
        out.extend_from_slice(&self.epoch.to_word());
        out.extend_from_slice(&self.capture_timestamp.to_word());
        out.extend_from_slice(&self.quorum_threshold.to_word());
        out.extend_from_slice(&self.total_voting_power.to_word());
        out.extend_from_slice(self.validators_root.as_bytes());
        out
    }

    pub fn hash(&self) -> H256 {
        keccak256(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ValidatorSetHeader {
        ValidatorSetHeader {
            version: 1,
            required_key_tag: KeyTag(0x0f),
            epoch: 42,
            capture_timestamp: 1_700_000_000,
            quorum_threshold: U256::from(671),
            total_voting_power: U256::from(1000),
            validators_root: H256::repeat_byte(0xaa),
        }
    }

    #[test]
    fn test_encoding_layout() {
        let encoded = header().encode();
        assert_eq!(encoded.len(), HEADER_ENCODED_LEN);
        assert_eq!(encoded[31], 1);
        assert_eq!(encoded[63], 0x0f);
        assert_eq!(encoded[95], 42);
        assert_eq!(u64::from_word(encoded[96..128].try_into().unwrap()), 1_700_000_000);
        assert_eq!(&encoded[158..160], &[0x02, 0x9f]);
        assert_eq!(&encoded[190..192], &[0x03, 0xe8]);
        assert!(encoded[192..].iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let base = header().hash();
        assert_eq!(base, header().hash());

        let mut h = header();
        h.capture_timestamp += 1;
        assert_ne!(h.hash(), base);

        let mut h = header();
        h.quorum_threshold = U256::from(672);
        assert_ne!(h.hash(), base);
    }
}
