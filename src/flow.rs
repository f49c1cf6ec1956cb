//! Sign and verify flows
//!
//! Each flow owns the state of the current file. Loading a new file
//! clears everything derived from the previous one before hashing starts,
//! so results from two different files are never mixed.

use std::path::Path;

use tracing::{info, warn};

use crate::crypto::Signature;
use crate::error::{DocError, Result};
use crate::hasher::{self, Digest};
use crate::registry::{Registry, TxReceipt};
use crate::session::WalletSession;
use crate::signer;
use crate::verifier::{VerificationAttempt, VerificationEngine, VerificationVerdict};

/// Current time in seconds since the Unix epoch
pub fn now_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Hash → sign → store
pub struct DocumentSigner<'a, R: Registry + ?Sized> {
    session: &'a WalletSession,
    registry: &'a R,
    digest: Option<Digest>,
    signature: Option<Signature>,
    receipt: Option<TxReceipt>,
}

impl<'a, R: Registry + ?Sized> DocumentSigner<'a, R> {
    pub fn new(session: &'a WalletSession, registry: &'a R) -> Self {
        Self {
            session,
            registry,
            digest: None,
            signature: None,
            receipt: None,
        }
    }

    fn reset(&mut self) {
        self.digest = None;
        self.signature = None;
        self.receipt = None;
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Digest {
        self.reset();
        let digest = hasher::hash_bytes(bytes);
        self.digest = Some(digest);
        digest
    }

    pub async fn load_file(&mut self, path: &Path) -> Result<Digest> {
        self.reset();
        let digest = hasher::hash_file(path).await?;
        self.digest = Some(digest);
        Ok(digest)
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        self.receipt.as_ref()
    }

    fn ensure_ready(&self) -> Result<Digest> {
        if !self.session.is_connected() {
            return Err(DocError::NoActiveSession);
        }
        if !self.session.is_correct_network() {
            return Err(DocError::Validation(format!(
                "wrong network, switch to {}",
                self.session.expected_network()
            )));
        }
        self.digest
            .ok_or_else(|| DocError::Validation("compute the file hash first".into()))
    }

    /// Ask the wallet to sign the current digest.
    pub async fn sign(&mut self) -> Result<&Signature> {
        let digest = self.ensure_ready()?;
        self.signature = None;
        self.receipt = None;

        let signature = signer::sign(self.session, digest.as_bytes()).await?;
        Ok(&*self.signature.insert(signature))
    }

    /// Record the current digest and signature in the registry.
    pub async fn store(&mut self, timestamp: u64) -> Result<&TxReceipt> {
        let digest = self.ensure_ready()?;
        let signature = self
            .signature
            .clone()
            .ok_or_else(|| DocError::Validation("sign the document before storing it".into()))?;
        self.receipt = None;

        let result = self.registry.store(&digest, timestamp, &signature).await;
        match result {
            Ok(receipt) => {
                info!(%digest, tx = %receipt.tx_hash, "document anchored");
                Ok(&*self.receipt.insert(receipt))
            }
            Err(err) if err.is_benign() => {
                info!(%digest, "document was already stored");
                Err(err)
            }
            Err(err) => {
                warn!(%digest, error = %err, "store failed");
                Err(err)
            }
        }
    }
}

/// Hash → check against the registry
pub struct DocumentVerifier<'a, R: Registry + ?Sized> {
    session: &'a WalletSession,
    registry: &'a R,
    digest: Option<Digest>,
    attempt: Option<VerificationAttempt>,
}

impl<'a, R: Registry + ?Sized> DocumentVerifier<'a, R> {
    pub fn new(session: &'a WalletSession, registry: &'a R) -> Self {
        Self {
            session,
            registry,
            digest: None,
            attempt: None,
        }
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Digest {
        self.attempt = None;
        let digest = hasher::hash_bytes(bytes);
        self.digest = Some(digest);
        digest
    }

    pub async fn load_file(&mut self, path: &Path) -> Result<Digest> {
        self.attempt = None;
        self.digest = None;
        let digest = hasher::hash_file(path).await?;
        self.digest = Some(digest);
        Ok(digest)
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Verdict of the latest attempt, if any
    pub fn verdict(&self) -> Option<&VerificationVerdict> {
        self.attempt.as_ref().map(|attempt| &attempt.verdict)
    }

    pub fn attempt(&self) -> Option<&VerificationAttempt> {
        self.attempt.as_ref()
    }

    /// Verify the current digest against `expected_signer`. The previous
    /// attempt is dropped before the new one starts.
    pub async fn verify(&mut self, expected_signer: &str) -> &VerificationAttempt {
        self.attempt = None;
        let attempt = VerificationEngine::new(self.registry)
            .verify(self.session, self.digest.as_ref(), expected_signer)
            .await;
        &*self.attempt.insert(attempt)
    }
}
