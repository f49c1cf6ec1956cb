//! In-process registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Registry, StoredRecord, TxReceipt};
use crate::crypto::{self, Signature};
use crate::error::{DocError, Result};
use crate::hasher::Digest;

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub store: usize,
    pub exists: usize,
    pub fetch: usize,
    pub verify: usize,
}

#[derive(Default)]
struct Shared {
    records: RwLock<HashMap<Digest, StoredRecord>>,
    offline: AtomicBool,
    verdict_override: RwLock<Option<bool>>,
    block: AtomicUsize,
    store_calls: AtomicUsize,
    exists_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

/// Registry held in memory. Clones share state; [`MemoryRegistry::connect`]
/// returns a handle that stores on behalf of a given account, the way a
/// contract records `msg.sender`.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    shared: Arc<Shared>,
    sender: Option<Address>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle whose stores are attributed to `sender`.
    pub fn connect(&self, sender: Address) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            sender: Some(sender),
        }
    }

    /// Simulate a dropped connection to the node.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Force every `verify_remote` answer, modelling a stale or buggy
    /// registry. `None` restores the real check.
    pub async fn override_remote_verdict(&self, verdict: Option<bool>) {
        *self.shared.verdict_override.write().await = verdict;
    }

    /// Overwrite a record in place, bypassing the duplicate guard.
    pub async fn tamper(&self, record: StoredRecord) {
        self.shared
            .records
            .write()
            .await
            .insert(record.digest, record);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            store: self.shared.store_calls.load(Ordering::SeqCst),
            exists: self.shared.exists_calls.load(Ordering::SeqCst),
            fetch: self.shared.fetch_calls.load(Ordering::SeqCst),
            verify: self.shared.verify_calls.load(Ordering::SeqCst),
        }
    }

    pub async fn len(&self) -> usize {
        self.shared.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_online(&self) -> Result<()> {
        if self.shared.offline.load(Ordering::SeqCst) {
            Err(DocError::Remote("connection to node lost".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn store(&self, digest: &Digest, timestamp: u64, signature: &Signature) -> Result<TxReceipt> {
        self.shared.store_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let signer = self
            .sender
            .ok_or_else(|| DocError::Remote("transaction has no sender account".into()))?;

        let mut records = self.shared.records.write().await;
        if records.contains_key(digest) {
            return Err(DocError::AlreadyExists(digest.to_hex()));
        }
        records.insert(
            *digest,
            StoredRecord {
                digest: *digest,
                signer,
                timestamp,
                signature: signature.clone(),
            },
        );

        let block = self.shared.block.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut seed = digest.as_bytes().to_vec();
        seed.extend_from_slice(&block.to_be_bytes());
        let tx_hash: B256 = alloy::primitives::keccak256(&seed);

        info!(%digest, %signer, block, "document stored");
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(block),
        })
    }

    async fn exists(&self, digest: &Digest) -> Result<bool> {
        self.shared.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        Ok(self.shared.records.read().await.contains_key(digest))
    }

    async fn fetch(&self, digest: &Digest) -> Result<StoredRecord> {
        self.shared.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        self.shared
            .records
            .read()
            .await
            .get(digest)
            .cloned()
            .ok_or_else(|| DocError::NotFound(digest.to_hex()))
    }

    async fn verify_remote(
        &self,
        digest: &Digest,
        claimed_signer: &Address,
        signature: &Signature,
    ) -> Result<bool> {
        self.shared.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        if let Some(verdict) = *self.shared.verdict_override.read().await {
            debug!(%digest, verdict, "returning overridden remote verdict");
            return Ok(verdict);
        }

        if !self.shared.records.read().await.contains_key(digest) {
            return Ok(false);
        }
        // an unrecoverable signature is simply not valid here
        Ok(crypto::verify_signature(digest, signature, claimed_signer).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use k256::ecdsa::SigningKey;

    fn signed(bytes: &[u8]) -> (Address, Digest, Signature) {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let digest = hash_bytes(bytes);
        let signature = crypto::sign_digest(&key, &digest).unwrap();
        (crypto::address_of(&key), digest, signature)
    }

    #[tokio::test]
    async fn test_store_then_fetch() {
        let (signer, digest, signature) = signed(b"hello");
        let registry = MemoryRegistry::new().connect(signer);

        assert!(!registry.exists(&digest).await.unwrap());
        let receipt = registry.store(&digest, 1_700_000_000, &signature).await.unwrap();
        assert_eq!(receipt.block_number, Some(1));

        assert!(registry.exists(&digest).await.unwrap());
        let record = registry.fetch(&digest).await.unwrap();
        assert_eq!(record.signer, signer);
        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.signature, signature);
    }

    #[tokio::test]
    async fn test_duplicate_store_is_already_exists() {
        let (signer, digest, signature) = signed(b"hello");
        let registry = MemoryRegistry::new().connect(signer);

        registry.store(&digest, 1, &signature).await.unwrap();
        let err = registry.store(&digest, 2, &signature).await.unwrap_err();
        assert!(matches!(err, DocError::AlreadyExists(_)));
        assert_eq!(registry.fetch(&digest).await.unwrap().timestamp, 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = registry.fetch(&hash_bytes(b"nope")).await.unwrap_err();
        assert!(matches!(err, DocError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_offline_is_remote_error() {
        let (signer, digest, signature) = signed(b"hello");
        let registry = MemoryRegistry::new().connect(signer);
        registry.set_offline(true);

        assert!(matches!(registry.exists(&digest).await, Err(DocError::Remote(_))));
        assert!(matches!(
            registry.store(&digest, 1, &signature).await,
            Err(DocError::Remote(_))
        ));
    }

    #[tokio::test]
    async fn test_store_without_sender_rejected() {
        let (_, digest, signature) = signed(b"hello");
        let registry = MemoryRegistry::new();
        assert!(matches!(
            registry.store(&digest, 1, &signature).await,
            Err(DocError::Remote(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_verify_remote_and_override() {
        let (signer, digest, signature) = signed(b"hello");
        let (other, _, _) = signed(b"other");
        let registry = MemoryRegistry::new().connect(signer);
        registry.store(&digest, 1, &signature).await.unwrap();

        assert!(registry.verify_remote(&digest, &signer, &signature).await.unwrap());
        assert!(!registry.verify_remote(&digest, &other, &signature).await.unwrap());

        registry.override_remote_verdict(Some(true)).await;
        assert!(registry.verify_remote(&digest, &other, &signature).await.unwrap());
        assert_eq!(registry.calls().verify, 3);
    }

    #[tokio::test]
    async fn test_handles_share_records() {
        let (signer, digest, signature) = signed(b"hello");
        let base = MemoryRegistry::new();
        base.connect(signer).store(&digest, 1, &signature).await.unwrap();
        assert!(base.exists(&digest).await.unwrap());
        assert_eq!(base.len().await, 1);
    }
}
