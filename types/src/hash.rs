//! The 32-byte chain hash.

use std::fmt;

use sha2::{Digest, Sha256};

/// A double-SHA-256 hash identifying a transaction or a block.
///
/// The bytes are kept in wire order (little endian). [`fmt::Display`] and
/// [`ChainHash::from_display_str`] use the conventional reversed-hex form
/// that explorers and node RPCs show.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// The all-zero hash.
    pub const ZERO: Self = Self([0; 32]);

    /// Hashes `data` with two rounds of SHA-256.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    /// The raw little-endian bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Builds a hash from raw little-endian bytes.
    ///
    /// Fails if `bytes` is not exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HashError::InvalidLength)?;
        Ok(Self(arr))
    }

    /// Parses the reversed-hex display form, e.g. a txid copied from an
    /// explorer.
    pub fn from_display_str(s: &str) -> Result<Self, HashError> {
        let mut bytes: Vec<u8> = hex::decode(s).map_err(|_| HashError::InvalidHex)?;
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength);
        }
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}

/// Error parsing a [`ChainHash`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("hash must be exactly 32 bytes")]
    InvalidLength,
    #[error("hash is not valid hex")]
    InvalidHex,
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0;
        bytes.reverse();
        f.write_str(&hex::encode(bytes))
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({self})")
    }
}

impl From<[u8; 32]> for ChainHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl serde::Serialize for ChainHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ChainHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_display_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The genesis block coinbase txid.
    const GENESIS_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn display_round_trips() {
        let hash = ChainHash::from_display_str(GENESIS_TXID).unwrap();
        assert_eq!(hash.to_string(), GENESIS_TXID);
    }

    #[test]
    fn display_reverses_bytes() {
        let hash = ChainHash::from_display_str(GENESIS_TXID).unwrap();
        // Wire order starts with the last display byte pair.
        assert_eq!(hash.0[0], 0x3b);
        assert_eq!(hash.0[31], 0x4a);
    }

    #[test]
    fn double_sha256_of_empty() {
        let hash = ChainHash::double_sha256(b"");
        assert_eq!(
            hex::encode(hash.as_bytes()),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456",
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            ChainHash::from_display_str("abcd"),
            Err(HashError::InvalidLength)
        );
        assert_eq!(
            ChainHash::from_display_str("zz"),
            Err(HashError::InvalidHex)
        );
    }

    #[test]
    fn serde_uses_display_form() {
        let hash = ChainHash::from_display_str(GENESIS_TXID).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{GENESIS_TXID}\""));
        assert_eq!(serde_json::from_str::<ChainHash>(&json).unwrap(), hash);
    }
}
