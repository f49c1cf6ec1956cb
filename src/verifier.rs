//! Verification engine
//!
//! Checks a digest against the registry in a fixed order, short-circuiting
//! on the first hard failure:
//!
//! 1. preconditions (session, network, digest, expected signer)
//! 2. existence
//! 3. fetch the stored record
//! 4. identity: stored signer vs expected signer
//! 5. remote verdict, conjoined with identity
//! 6. local recovery of the signer from the stored signature
//!
//! The remote and local verdicts are kept apart so that a disagreement
//! between them stays visible.

use std::fmt;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::{info, warn};

use crate::address;
use crate::crypto;
use crate::error::{DocError, Result};
use crate::hasher::Digest;
use crate::registry::{Registry, StoredRecord};
use crate::session::WalletSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Idle,
    Hashed,
    Checking,
    Found,
    NotFound,
    Evaluated,
    Failed,
}

/// The stored record belongs to a different signer than the one asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerMismatch {
    pub expected: Address,
    pub stored: Address,
}

impl fmt::Display for SignerMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the expected signer {} does not match the signer stored on-chain {}",
            self.expected, self.stored
        )
    }
}

/// Result of a completed evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Registry accepted the tuple *and* the stored signer is the expected one
    pub on_chain_valid: bool,
    /// Signer recovered locally from the stored signature is the expected one
    pub off_chain_valid: bool,
    pub identity_match: bool,
    /// Raw answer of the registry's own check
    pub remote_assertion: bool,
    pub expected_signer: Address,
    pub recovered_address: Address,
    pub stored_record: StoredRecord,
    pub signer_mismatch: Option<SignerMismatch>,
}

impl Evaluation {
    pub fn is_valid(&self) -> bool {
        self.on_chain_valid && self.off_chain_valid && self.identity_match
    }

    /// Registry and local recovery reached different conclusions. Points to
    /// a registry bug or a tampered record.
    pub fn verdicts_disagree(&self) -> bool {
        self.on_chain_valid != self.off_chain_valid
    }
}

/// Outcome of one verification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationVerdict {
    Pending,
    Evaluated(Box<Evaluation>),
    Failed(DocError),
}

impl VerificationVerdict {
    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            VerificationVerdict::Evaluated(evaluation) => Some(evaluation.as_ref()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DocError> {
        match self {
            VerificationVerdict::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VerificationVerdict::Failed(DocError::NotFound(_)))
    }
}

/// One attempt: the states it went through and its verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationAttempt {
    pub trail: Vec<VerificationState>,
    pub verdict: VerificationVerdict,
}

impl VerificationAttempt {
    fn new() -> Self {
        Self {
            trail: vec![VerificationState::Idle],
            verdict: VerificationVerdict::Pending,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.trail
            .last()
            .copied()
            .unwrap_or(VerificationState::Idle)
    }

    fn enter(&mut self, state: VerificationState) {
        self.trail.push(state);
    }

    fn fail(mut self, err: DocError) -> Self {
        let state = if matches!(err, DocError::NotFound(_)) {
            VerificationState::NotFound
        } else {
            VerificationState::Failed
        };
        self.enter(state);
        self.verdict = VerificationVerdict::Failed(err);
        self
    }
}

pub struct VerificationEngine<'a, R: Registry + ?Sized> {
    registry: &'a R,
}

impl<'a, R: Registry + ?Sized> VerificationEngine<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    /// Run one attempt. Never returns partial results: either every field
    /// of the evaluation is computed, or the attempt fails.
    pub async fn verify(
        &self,
        session: &WalletSession,
        digest: Option<&Digest>,
        expected_signer: &str,
    ) -> VerificationAttempt {
        let mut attempt = VerificationAttempt::new();

        // Step 1: preconditions, no remote calls
        let (digest, expected) = match check_preconditions(session, digest, expected_signer) {
            Ok(checked) => checked,
            Err(err) => return attempt.fail(err),
        };
        attempt.enter(VerificationState::Hashed);

        info!(%digest, expected = %expected, "verifying document");
        attempt.enter(VerificationState::Checking);

        // Step 2: existence
        match self.registry.exists(&digest).await {
            Ok(true) => {}
            Ok(false) => {
                info!(%digest, "document not registered");
                return attempt.fail(DocError::NotFound(digest.to_hex()));
            }
            Err(err) => return attempt.fail(err),
        }
        attempt.enter(VerificationState::Found);

        match self.evaluate(&digest, expected).await {
            Ok(evaluation) => {
                attempt.enter(VerificationState::Evaluated);
                attempt.verdict = VerificationVerdict::Evaluated(Box::new(evaluation));
                attempt
            }
            Err(err) => {
                warn!(%digest, error = %err, "verification failed");
                attempt.fail(err)
            }
        }
    }

    /// Steps 3 to 6.
    async fn evaluate(&self, digest: &Digest, expected: Address) -> Result<Evaluation> {
        // Step 3: stored record
        let stored = self.registry.fetch(digest).await?;

        // Step 4: identity
        let identity_match = address::same_address(&stored.signer, &expected);

        // Step 5: remote verdict, only counted when the identity matches
        let remote_assertion = self
            .registry
            .verify_remote(digest, &expected, &stored.signature)
            .await?;
        let on_chain_valid = remote_assertion && identity_match;

        // Step 6: local recovery
        let recovered_address = crypto::recover_signer(digest, &stored.signature)?;
        let off_chain_valid = address::same_address(&recovered_address, &expected);

        let signer_mismatch = (!identity_match).then(|| SignerMismatch {
            expected,
            stored: stored.signer,
        });
        if let Some(mismatch) = &signer_mismatch {
            warn!(%digest, "{}", mismatch);
        }

        let evaluation = Evaluation {
            on_chain_valid,
            off_chain_valid,
            identity_match,
            remote_assertion,
            expected_signer: expected,
            recovered_address,
            stored_record: stored,
            signer_mismatch,
        };

        if evaluation.verdicts_disagree() {
            warn!(
                %digest,
                on_chain_valid,
                off_chain_valid,
                "registry and local recovery disagree"
            );
        }
        info!(
            %digest,
            on_chain_valid,
            off_chain_valid,
            identity_match,
            "verification evaluated"
        );

        Ok(evaluation)
    }
}

fn check_preconditions(
    session: &WalletSession,
    digest: Option<&Digest>,
    expected_signer: &str,
) -> Result<(Digest, Address)> {
    if !session.is_connected() {
        return Err(DocError::Validation("connect a wallet first".into()));
    }
    if !session.is_correct_network() {
        return Err(DocError::Validation(format!(
            "wrong network: wallet is on {}, expected {}",
            session
                .current_network_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".into()),
            session.expected_network()
        )));
    }
    let digest = *digest.ok_or_else(|| DocError::Validation("compute the file hash first".into()))?;
    let expected = address::normalize(expected_signer)?;
    Ok((digest, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Signature;
    use crate::hasher::hash_bytes;
    use crate::registry::MockRegistry;
    use crate::session::{LocalKeyHolder, DEFAULT_NETWORK_ID};
    use k256::ecdsa::SigningKey;
    use std::sync::Arc;

    struct Fixture {
        signer: Address,
        other: Address,
        digest: Digest,
        signature: Signature,
    }

    fn fixture() -> Fixture {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let other = SigningKey::random(&mut rand::rngs::OsRng);
        let digest = hash_bytes(b"hello");
        Fixture {
            signer: crypto::address_of(&key),
            other: crypto::address_of(&other),
            digest,
            signature: crypto::sign_digest(&key, &digest).unwrap(),
        }
    }

    async fn session_on(network_id: u64) -> WalletSession {
        let holder = LocalKeyHolder::new(
            vec![SigningKey::random(&mut rand::rngs::OsRng)],
            network_id,
        );
        WalletSession::connect_to(Arc::new(holder), DEFAULT_NETWORK_ID)
            .await
            .unwrap()
    }

    fn record(f: &Fixture, signer: Address) -> StoredRecord {
        StoredRecord {
            digest: f.digest,
            signer,
            timestamp: 1_700_000_000,
            signature: f.signature.clone(),
        }
    }

    fn untouched_registry() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_exists().never();
        registry.expect_fetch().never();
        registry.expect_verify_remote().never();
        registry.expect_store().never();
        registry
    }

    fn found_registry(stored: StoredRecord, remote: bool) -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_exists().times(1).returning(|_| Ok(true));
        registry
            .expect_fetch()
            .times(1)
            .returning(move |_| Ok(stored.clone()));
        registry
            .expect_verify_remote()
            .times(1)
            .returning(move |_, _, _| Ok(remote));
        registry
    }

    #[tokio::test]
    async fn test_matching_signer_is_valid_everywhere() {
        let f = fixture();
        let registry = found_registry(record(&f, f.signer), true);
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string().to_lowercase())
            .await;

        assert_eq!(
            attempt.trail,
            vec![
                VerificationState::Idle,
                VerificationState::Hashed,
                VerificationState::Checking,
                VerificationState::Found,
                VerificationState::Evaluated,
            ]
        );
        let evaluation = attempt.verdict.evaluation().unwrap();
        assert!(evaluation.is_valid());
        assert_eq!(evaluation.recovered_address, f.signer);
        assert!(evaluation.signer_mismatch.is_none());
        assert!(!evaluation.verdicts_disagree());
    }

    #[tokio::test]
    async fn test_remote_true_does_not_override_identity_mismatch() {
        let f = fixture();
        let registry = found_registry(record(&f, f.signer), true);
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.other.to_string())
            .await;

        let evaluation = attempt.verdict.evaluation().unwrap();
        assert!(evaluation.remote_assertion);
        assert!(!evaluation.identity_match);
        assert!(!evaluation.on_chain_valid);
        assert!(!evaluation.off_chain_valid);
        let mismatch = evaluation.signer_mismatch.as_ref().unwrap();
        assert_eq!(mismatch.expected, f.other);
        assert_eq!(mismatch.stored, f.signer);
    }

    #[tokio::test]
    async fn test_not_registered_stops_before_fetch() {
        let f = fixture();
        let mut registry = MockRegistry::new();
        registry.expect_exists().times(1).returning(|_| Ok(false));
        registry.expect_fetch().never();
        registry.expect_verify_remote().never();
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;

        assert_eq!(attempt.state(), VerificationState::NotFound);
        assert!(attempt.verdict.is_not_found());
        assert!(attempt.verdict.evaluation().is_none());
    }

    #[tokio::test]
    async fn test_invalid_signer_makes_no_remote_call() {
        let f = fixture();
        let registry = untouched_registry();
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), "0xnot-an-address")
            .await;

        assert_eq!(attempt.state(), VerificationState::Failed);
        assert!(matches!(attempt.verdict.error(), Some(DocError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_digest_and_wrong_network_rejected_locally() {
        let f = fixture();
        let registry = untouched_registry();

        let session = session_on(DEFAULT_NETWORK_ID).await;
        let attempt = VerificationEngine::new(&registry)
            .verify(&session, None, &f.signer.to_string())
            .await;
        assert!(matches!(attempt.verdict.error(), Some(DocError::Validation(_))));

        let session = session_on(1).await;
        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;
        assert!(
            matches!(attempt.verdict.error(), Some(DocError::Validation(msg)) if msg.contains("wrong network"))
        );
    }

    #[tokio::test]
    async fn test_disconnected_session_rejected_locally() {
        let f = fixture();
        let registry = untouched_registry();
        let mut session = session_on(DEFAULT_NETWORK_ID).await;
        session.disconnect();

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;
        assert!(matches!(attempt.verdict.error(), Some(DocError::Validation(_))));
    }

    #[tokio::test]
    async fn test_remote_failure_discards_partial_results() {
        let f = fixture();
        let stored = record(&f, f.signer);
        let mut registry = MockRegistry::new();
        registry.expect_exists().returning(|_| Ok(true));
        registry
            .expect_fetch()
            .returning(move |_| Ok(stored.clone()));
        registry
            .expect_verify_remote()
            .returning(|_, _, _| Err(DocError::Remote("node went away".into())));
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;

        assert_eq!(attempt.state(), VerificationState::Failed);
        assert!(attempt.verdict.evaluation().is_none());
        assert!(
            matches!(attempt.verdict.error(), Some(DocError::Remote(msg)) if msg.contains("node went away"))
        );
    }

    #[tokio::test]
    async fn test_tampered_signature_shows_disagreement() {
        let f = fixture();
        // registry still claims validity, but the stored signature is for another digest
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let mut stored = record(&f, f.signer);
        stored.signature = crypto::sign_digest(&key, &hash_bytes(b"forged")).unwrap();
        let registry = found_registry(stored, true);
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;

        let evaluation = attempt.verdict.evaluation().unwrap();
        assert!(evaluation.identity_match);
        assert!(evaluation.on_chain_valid);
        assert!(!evaluation.off_chain_valid);
        assert!(evaluation.verdicts_disagree());
        assert_ne!(evaluation.recovered_address, f.signer);
    }

    #[tokio::test]
    async fn test_unrecoverable_stored_signature_fails_attempt() {
        let f = fixture();
        let mut stored = record(&f, f.signer);
        stored.signature = Signature::from_bytes(vec![0u8; 10]);
        let registry = found_registry(stored, false);
        let session = session_on(DEFAULT_NETWORK_ID).await;

        let attempt = VerificationEngine::new(&registry)
            .verify(&session, Some(&f.digest), &f.signer.to_string())
            .await;

        assert_eq!(attempt.state(), VerificationState::Failed);
        assert!(matches!(attempt.verdict.error(), Some(DocError::InvalidInput(_))));
    }

    #[test]
    fn test_mismatch_message_names_both_addresses() {
        let mismatch = SignerMismatch {
            expected: Address::repeat_byte(0xbb),
            stored: Address::repeat_byte(0xaa),
        };
        let text = mismatch.to_string();
        assert!(text.contains(&Address::repeat_byte(0xbb).to_string()));
        assert!(text.contains(&Address::repeat_byte(0xaa).to_string()));
    }
}
