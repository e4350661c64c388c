//! Compact set of validator indices.
//!
//! Byte format: bit `i` is stored in byte `i / 8` at position `i % 8`
//! (least significant bit first). Trailing zero bytes are trimmed, so the
//! empty set encodes to an empty byte string.

use bitvec::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Default)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `index`, returning `false` when it was already present.
    pub fn insert(&mut self, index: u32) -> bool {
        let i = index as usize;
        if i >= self.bits.len() {
            self.bits.resize(i + 1, false);
        }
        let present = self.bits[i];
        self.bits.set(i, true);
        !present
    }

    /// Removes `index`, returning `true` when it was present.
    pub fn remove(&mut self, index: u32) -> bool {
        let i = index as usize;
        if !self.contains(index) {
            return false;
        }
        self.bits.set(i, false);
        true
    }

    pub fn contains(&self, index: u32) -> bool {
        let i = index as usize;
        i < self.bits.len() && self.bits[i]
    }

    /// Cardinality.
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter_ones().map(|i| i as u32)
    }

    pub fn union(&self, other: &Bitmap) -> Bitmap {
        self.iter().chain(other.iter()).collect()
    }

    /// Indices in `[0, total)` that are not members.
    pub fn complement_within(&self, total: u32) -> Bitmap {
        (0..total).filter(|i| !self.contains(*i)).collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.bits.last_one().map(|last| last / 8 + 1).unwrap_or(0);
        let mut out = vec![0u8; width];
        for i in self.bits.iter_ones() {
            out[i / 8] |= 1 << (i % 8);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
        }
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for Bitmap {}

impl FromIterator<u32> for Bitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bitmap = Bitmap::new();
        for index in iter {
            bitmap.insert(index);
        }
        bitmap
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for Bitmap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        crate::serde_hex::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Bitmap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = crate::serde_hex::deserialize(deserializer)?;
        Ok(Bitmap::from_bytes(&bytes))
    }
}
