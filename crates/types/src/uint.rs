use primitive_types::{U256 as PrimitiveU256, U512 as PrimitiveU512};

pub type U256 = PrimitiveU256;
pub type U512 = PrimitiveU512;

/// Number of decimals used by quorum percentages (`10^18` is 100%).
pub const QUORUM_PRECISION_DECIMALS: usize = 18;

/// Returns `10^18`, the fixed point value of 100%.
pub fn quorum_precision() -> U256 {
    U256::exp10(QUORUM_PRECISION_DECIMALS)
}

pub trait UintExt: Sized {
    fn from_word(word: &[u8; 32]) -> Self;
    /// Big-endian 32-byte ABI word.
    fn to_word(&self) -> [u8; 32];
}

impl UintExt for U256 {
    fn from_word(word: &[u8; 32]) -> Self {
        U256::from_big_endian(word)
    }

    fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        self.to_big_endian(&mut word);
        word
    }
}

impl UintExt for u64 {
    fn from_word(word: &[u8; 32]) -> Self {
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&word[24..]);
        u64::from_be_bytes(tail)
    }

    fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&self.to_be_bytes());
        word
    }
}
