//! Content addressing: Keccak-256 digests of file bytes

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocError, Result};

/// Width of a digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Keccak-256 content address of a file
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Rejects anything that is not exactly [`DIGEST_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| {
            DocError::InvalidInput(format!(
                "digest must be {} bytes, got {}",
                DIGEST_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_b256(&self) -> B256 {
        B256::from(self.0)
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|e| DocError::InvalidInput(format!("invalid digest hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_hex()
    }
}

impl TryFrom<String> for Digest {
    type Error = DocError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<B256> for Digest {
    fn from(value: B256) -> Self {
        Self(value.0)
    }
}

/// Hash an in-memory buffer. Never fails; the empty buffer is legal.
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    Digest::from(keccak256(bytes))
}

/// Read a file and hash its contents.
///
/// The only failure mode is a read failure, reported as [`DocError::Io`].
pub async fn hash_file(path: &Path) -> Result<Digest> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DocError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    let digest = hash_bytes(&bytes);
    debug!(path = %path.display(), size = bytes.len(), %digest, "hashed file");
    Ok(digest)
}
