//! Migration identifiers.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;

/// Unique id of one migration run.
///
/// The first eight bytes are the creation time in microseconds (big-endian),
/// so ids sort roughly by creation time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationId([u8; 16]);

impl MigrationId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        let timestamp = crate::current_timestamp();
        let entropy = RandomState::new().build_hasher().finish();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&timestamp.to_be_bytes());
        hasher.update(&entropy.to_be_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&timestamp.to_be_bytes());
        id[8..].copy_from_slice(&hash.as_bytes()[..8]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MigrationId({})", self.to_hex())
    }
}

impl FromStr for MigrationId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for MigrationId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MigrationId> for String {
    fn from(value: MigrationId) -> Self {
        value.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<MigrationId> =
            (0..100).map(|_| MigrationId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_hex_round_trip() {
        let id = MigrationId::generate();
        let parsed: MigrationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_hex().len(), 32);
        assert!("not-hex".parse::<MigrationId>().is_err());
    }
}
