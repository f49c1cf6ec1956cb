//! Signer bridge: one-shot signature requests to the wallet

use tracing::{info, warn};

use crate::crypto::Signature;
use crate::error::{DocError, Result};
use crate::hasher::Digest;
use crate::session::WalletSession;

/// Ask the session's key holder to sign `digest` with the selected
/// account.
///
/// There are no retries: a declined or failed request is returned as-is
/// and must be re-initiated by the caller.
pub async fn sign(session: &WalletSession, digest: &[u8]) -> Result<Signature> {
    let account = session.current_account().ok_or(DocError::NoActiveSession)?;
    let digest = Digest::from_slice(digest)?;

    info!(%account, %digest, "requesting signature");
    match session.key_holder().sign_digest(&account, &digest).await {
        Ok(signature) => Ok(signature),
        Err(err @ (DocError::UserRejected
        | DocError::NoActiveSession
        | DocError::Transport(_)
        | DocError::InvalidInput(_))) => {
            warn!(%account, error = %err, "signature request failed");
            Err(err)
        }
        Err(other) => {
            warn!(%account, error = %other, "signature request failed");
            Err(DocError::Transport(other.to_string()))
        }
    }
}
