//! Serialization of `Vec<u8>` as a `0x`-prefixed hex string.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::{borrow::Cow, fmt};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Cow::<str>::deserialize(deserializer)?;
    from_hex_str(&s).map_err(de::Error::custom)
}

pub fn from_hex_str(s: &str) -> Result<Vec<u8>, FromHexError> {
    let s = s.strip_prefix("0x").ok_or(FromHexError::MissingPrefix)?;
    hex::decode(s).map_err(FromHexError::Hex)
}

#[derive(Debug)]
pub enum FromHexError {
    MissingPrefix,
    Hex(hex::FromHexError),
}

impl fmt::Display for FromHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingPrefix => f.write_str("missing '0x' prefix"),
            Self::Hex(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for FromHexError {}
