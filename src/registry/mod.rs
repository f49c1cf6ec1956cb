//! Registry client: the four calls the flows make against the
//! append-only document registry.
//!
//! - [`EvmRegistry`]: a deployed `DocumentRegistry` contract over JSON-RPC
//! - [`MemoryRegistry`]: in-process registry with the same semantics

mod evm;
mod memory;

pub use evm::*;
pub use memory::*;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::crypto::Signature;
use crate::error::Result;
use crate::hasher::Digest;

/// The authoritative on-chain tuple for one digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub digest: Digest,
    pub signer: Address,
    /// Seconds since the Unix epoch, as supplied by the storer
    pub timestamp: u64,
    pub signature: Signature,
}

/// Confirmation of a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Remote record store keyed by digest.
///
/// Invariant: a confirmed `store` is visible to later `exists`/`fetch`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Record `(digest, timestamp, signature)` for the caller's account.
    ///
    /// Fails with `AlreadyExists` when the digest is already recorded and
    /// `Remote` for any other rejection.
    async fn store(&self, digest: &Digest, timestamp: u64, signature: &Signature) -> Result<TxReceipt>;

    /// Whether a record exists for `digest`
    async fn exists(&self, digest: &Digest) -> Result<bool>;

    /// Read back the record. Fails with `NotFound` when absent; call
    /// [`Registry::exists`] first.
    async fn fetch(&self, digest: &Digest) -> Result<StoredRecord>;

    /// The registry's own signature check. One vote among several.
    async fn verify_remote(
        &self,
        digest: &Digest,
        claimed_signer: &Address,
        signature: &Signature,
    ) -> Result<bool>;
}

/// Revert reasons the registry uses for a duplicate store
pub(crate) fn is_duplicate_reason(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already stored") || lower.contains("already exists")
}
