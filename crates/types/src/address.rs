use crate::{keccak256, Result, TypesError, H160};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 20-byte account address. Ordering is byte-wise, which matches the
/// numeric ordering of the address as a `uint160`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(H160);

impl Address {
    pub const ZERO: Address = Address(H160::zero());

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(H160::from(bytes))
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 20 {
            return Err(TypesError::InvalidLength {
                expected: 20,
                actual: slice.len(),
            });
        }
        Ok(Address(H160::from_slice(slice)))
    }

    /// Convenience for tests and fixtures: an address whose last byte is `n`.
    pub fn from_low_u64(n: u64) -> Self {
        Address(H160::from_low_u64_be(n))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Left-padded 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(self.0.as_bytes());
        word
    }

    /// EIP-55 mixed-case representation.
    pub fn checksum(&self) -> String {
        let lower = hex::encode(self.0.as_bytes());
        let hash = keccak256(lower.as_bytes());

        let mixed: String = lower
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                let byte = hash.as_bytes()[i / 2];
                let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
                if ch.is_ascii_alphabetic() && nibble >= 8 {
                    ch.to_ascii_uppercase()
                } else {
                    ch
                }
            })
            .collect();

        format!("0x{}", mixed)
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 40 {
            return Err(TypesError::InvalidLength {
                expected: 40,
                actual: s.len(),
            });
        }

        let bytes = hex::decode(s).map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        let addr = Address::from_slice(&bytes)?;

        let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
        if has_upper && &addr.checksum()[2..] != s {
            return Err(TypesError::InvalidChecksum);
        }

        Ok(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.checksum())
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl From<H160> for Address {
    fn from(hash: H160) -> Self {
        Address(hash)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address::from_bytes(bytes)
    }
}
