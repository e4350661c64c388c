use serde::{Deserialize, Serialize};
use std::fmt;

/// Key scheme encoded in the upper nibble of a [`KeyTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    BlsBn254,
    EcdsaSecp256k1,
    Bls12381,
    Unknown(u8),
}

impl From<u8> for KeyType {
    fn from(value: u8) -> Self {
        match value {
            0 => KeyType::BlsBn254,
            1 => KeyType::EcdsaSecp256k1,
            2 => KeyType::Bls12381,
            other => KeyType::Unknown(other),
        }
    }
}

impl KeyType {
    pub fn as_u8(&self) -> u8 {
        match self {
            KeyType::BlsBn254 => 0,
            KeyType::EcdsaSecp256k1 => 1,
            KeyType::Bls12381 => 2,
            KeyType::Unknown(other) => *other,
        }
    }
}

/// Identifies a key scheme and purpose: `type << 4 | id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTag(pub u8);

impl KeyTag {
    pub fn new(key_type: KeyType, id: u8) -> Self {
        KeyTag((key_type.as_u8() << 4) | (id & 0x0f))
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::from(self.0 >> 4)
    }

    pub fn id(&self) -> u8 {
        self.0 & 0x0f
    }
}

impl fmt::Display for KeyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0 >> 4, self.id())
    }
}

/// A compact public key registered by an operator under one tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorKey {
    pub tag: KeyTag,
    #[serde(with = "crate::serde_hex")]
    pub payload: Vec<u8>,
}

impl ValidatorKey {
    pub fn new(tag: KeyTag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_tag_layout() {
        let tag = KeyTag::new(KeyType::EcdsaSecp256k1, 3);
        assert_eq!(tag.0, 0x13);
        assert_eq!(tag.key_type(), KeyType::EcdsaSecp256k1);
        assert_eq!(tag.id(), 3);
        assert_eq!(tag.to_string(), "1/3");
    }

    #[test]
    fn test_key_payload_hex_serde() {
        let key = ValidatorKey::new(KeyTag(0x0f), vec![0xde, 0xad]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"tag":15,"payload":"0xdead"}"#);
        let back: ValidatorKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
