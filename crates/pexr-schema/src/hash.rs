//! Content digests.

use serde::{Deserialize, Deserializer, Serialize};

/// A validated SHA-256 digest (64 lowercase hex characters).
///
/// Used for upstream verification: index links carry a `#sha256=` fragment
/// and downloads are checked against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Hash(String);

/// Error returned when a digest string is not well formed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid SHA256 digest: expected 64 hex characters, got '{0}'")]
pub struct InvalidDigest(pub String);

impl Sha256Hash {
    /// Create a new `Sha256Hash`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` / `sha256=` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDigest`] if the hex portion is not exactly 64 ASCII hex characters.
    pub fn new(s: &str) -> Result<Self, InvalidDigest> {
        let digest = s
            .strip_prefix("sha256:")
            .or_else(|| s.strip_prefix("sha256="))
            .unwrap_or(s);
        match hex::decode(digest) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self::from_digest(&bytes)),
            _ => Err(InvalidDigest(s.to_string())),
        }
    }

    /// Wrap the output of a finished `sha2::Sha256` hasher.
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// BLAKE3 hash for internal content keys (cache entries, extraction dirs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blake3Hash(String);

impl Blake3Hash {
    /// Compute the BLAKE3 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Wrap a finished incremental hasher.
    pub fn from_hasher(hasher: &blake3::Hasher) -> Self {
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, for directory names.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Blake3Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_accepts_prefixes_and_lowercases() {
        let upper = EMPTY_SHA256.to_ascii_uppercase();
        assert_eq!(Sha256Hash::new(&upper).unwrap().as_str(), EMPTY_SHA256);
        assert_eq!(
            Sha256Hash::new(&format!("sha256={EMPTY_SHA256}"))
                .unwrap()
                .as_str(),
            EMPTY_SHA256
        );
    }

    #[test]
    fn sha256_rejects_bad_input() {
        assert!(Sha256Hash::new("abc").is_err());
        assert!(Sha256Hash::new(&"z".repeat(64)).is_err());
        assert!(Sha256Hash::new(&"ab".repeat(31)).is_err());
        assert!(serde_json::from_str::<Sha256Hash>("\"nope\"").is_err());
    }

    #[test]
    fn sha256_from_digest_matches_hex() {
        assert_eq!(Sha256Hash::from_digest(&[0x00, 0xab, 0xff]).as_str(), "00abff");
    }

    #[test]
    fn blake3_deterministic_and_shortens() {
        let h1 = Blake3Hash::compute(b"test data");
        let h2 = Blake3Hash::compute(b"test data");
        assert_eq!(h1, h2);
        assert_eq!(h1.as_str().len(), 64);
        assert_eq!(h1.short(12).len(), 12);
        assert_ne!(h1, Blake3Hash::compute(b"other"));
    }

    #[test]
    fn blake3_hasher_matches_one_shot() {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(
            Blake3Hash::from_hasher(&hasher),
            Blake3Hash::compute(b"hello world")
        );
    }
}
