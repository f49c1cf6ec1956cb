//! Recoverable secp256k1 signatures over document digests
//!
//! Digests are signed as EIP-191 personal messages: the 32 raw digest
//! bytes are prefixed with `"\x19Ethereum Signed Message:\n32"` and
//! hashed with Keccak-256 before signing. Recovery reverses this to the
//! signer's address.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{eip191_hash_message, keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};

use crate::error::{DocError, Result};
use crate::hasher::Digest;

/// r (32) || s (32) || v (1)
pub const SIGNATURE_LEN: usize = 65;

/// Signature bytes as produced by a key holder or read back from the
/// registry. Opaque until recovered; a stored value may be malformed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// Split into the ECDSA signature and recovery id, normalizing a
    /// high-s value the way Ethereum clients do.
    fn to_recoverable(&self) -> Result<(EcdsaSignature, RecoveryId)> {
        if self.0.len() != SIGNATURE_LEN {
            return Err(DocError::InvalidInput(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LEN,
                self.0.len()
            )));
        }

        let v = match self.0[64] {
            27 | 28 => self.0[64] - 27,
            0 | 1 => self.0[64],
            other => {
                return Err(DocError::InvalidInput(format!(
                    "invalid recovery byte: {}",
                    other
                )))
            }
        };
        let mut recovery_id = RecoveryId::from_byte(v)
            .ok_or_else(|| DocError::InvalidInput(format!("invalid recovery id: {}", v)))?;

        let mut signature = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|e| DocError::InvalidInput(format!("invalid signature: {}", e)))?;

        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        Ok((signature, recovery_id))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|e| DocError::InvalidInput(format!("invalid signature hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        signature.to_hex()
    }
}

impl TryFrom<String> for Signature {
    type Error = DocError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// The EIP-191 hash that is actually signed for a digest
pub fn message_hash(digest: &Digest) -> B256 {
    eip191_hash_message(digest.as_bytes())
}

/// Sign a digest with a local key.
pub fn sign_digest(key: &SigningKey, digest: &Digest) -> Result<Signature> {
    let prehash = message_hash(digest);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(prehash.as_slice())
        .map_err(|e| DocError::InvalidInput(format!("signing failed: {}", e)))?;

    let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
    bytes.extend_from_slice(&signature.to_bytes());
    bytes.push(27 + recovery_id.to_byte());
    Ok(Signature(bytes))
}

/// Recover the address that signed `digest`.
pub fn recover_signer(digest: &Digest, signature: &Signature) -> Result<Address> {
    let (sig, recovery_id) = signature.to_recoverable()?;
    let prehash = message_hash(digest);
    let key = VerifyingKey::recover_from_prehash(prehash.as_slice(), &sig, recovery_id)
        .map_err(|e| DocError::InvalidInput(format!("cannot recover signer: {}", e)))?;
    Ok(address_of_verifying_key(&key))
}

/// Verify that `signature` over `digest` was produced by `expected`.
pub fn verify_signature(digest: &Digest, signature: &Signature, expected: &Address) -> Result<bool> {
    let recovered = recover_signer(digest, signature)?;
    Ok(crate::address::same_address(&recovered, expected))
}

/// Ethereum address of a public key: last 20 bytes of the Keccak-256
/// of the uncompressed point without its `0x04` tag.
pub fn address_of_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

pub fn address_of(key: &SigningKey) -> Address {
    address_of_verifying_key(key.verifying_key())
}

/// Parse a hex private key, with or without `0x`.
pub fn signing_key_from_hex(input: &str) -> Result<SigningKey> {
    let trimmed = input.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(stripped)
        .map_err(|_| DocError::InvalidInput("private key is not valid hex".into()))?;
    SigningKey::from_slice(&bytes)
        .map_err(|_| DocError::InvalidInput("private key is not a valid secp256k1 scalar".into()))
}
