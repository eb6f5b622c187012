//! Content hash identifying a beatmap: the MD5 digest of the raw `.osu` bytes.

use std::{fmt, path::Path, str::FromStr};

use thiserror::Error;

/// Why a string is not a content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("`{0}` is not a 32-digit hexadecimal MD5 digest")]
pub struct InvalidHash(pub String);

/// MD5 digest of a file, written as 32 lowercase hexadecimal digits.
///
/// Stored as a `u128` so comparisons and hashing stay cheap. Serialized as its hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ContentHash(u128);

impl ContentHash {
    /// Hashes raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(u128::from_be_bytes(md5::compute(bytes).0))
    }

    /// Hashes a file's content.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be read.
    pub fn of_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::read(path).map(|bytes| Self::of_bytes(&bytes))
    }

    /// The digest as a number.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for ContentHash {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidHash(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| InvalidHash(s.to_string()))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_string()
    }
}
