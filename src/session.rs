//! Wallet sessions and key holders
//!
//! A [`WalletSession`] is passed explicitly into the sign and verify
//! flows. Account and network notifications are published on a
//! broadcast channel; the flows never subscribe to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
#[cfg(test)]
use mockall::automock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::crypto::{self, Signature};
use crate::error::{DocError, Result};
use crate::hasher::Digest;

/// Chain id of a local development node
pub const DEFAULT_NETWORK_ID: u64 = 31337;

const EVENT_CAPACITY: usize = 16;

/// External holder of the private keys. The core never sees key
/// material; it only asks for accounts, the network, and signatures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyHolder: Send + Sync {
    /// Accounts the holder exposes, in its preferred order
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Network the holder is currently connected to
    async fn network_id(&self) -> Result<u64>;

    /// Sign a digest with `account`. May suspend pending user consent.
    async fn sign_digest(&self, account: &Address, digest: &Digest) -> Result<Signature>;
}

/// Notifications emitted when the wallet's state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { account: Address, network_id: u64 },
    AccountsChanged(Vec<Address>),
    NetworkChanged(u64),
    Disconnected,
}

/// Explicit connection state for one wallet.
pub struct WalletSession {
    key_holder: Arc<dyn KeyHolder>,
    expected_network: u64,
    accounts: Vec<Address>,
    selected: Option<Address>,
    network_id: Option<u64>,
    events: broadcast::Sender<SessionEvent>,
}

impl WalletSession {
    pub fn new(key_holder: Arc<dyn KeyHolder>, expected_network: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key_holder,
            expected_network,
            accounts: Vec::new(),
            selected: None,
            network_id: None,
            events,
        }
    }

    /// Create and connect in one step.
    pub async fn connect_to(key_holder: Arc<dyn KeyHolder>, expected_network: u64) -> Result<Self> {
        let mut session = Self::new(key_holder, expected_network);
        session.connect().await?;
        Ok(session)
    }

    /// Request accounts from the key holder and select the first one.
    pub async fn connect(&mut self) -> Result<()> {
        let accounts = self.key_holder.accounts().await?;
        let first = *accounts.first().ok_or(DocError::NoActiveSession)?;
        let network_id = self.key_holder.network_id().await?;

        info!(account = %first, network_id, "wallet connected");
        self.accounts = accounts;
        self.selected = Some(first);
        self.network_id = Some(network_id);
        self.publish(SessionEvent::Connected {
            account: first,
            network_id,
        });
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.accounts.clear();
        self.selected = None;
        self.network_id = None;
        self.publish(SessionEvent::Disconnected);
    }

    /// Switch to another account the holder exposes.
    pub fn select_account(&mut self, account: Address) -> Result<()> {
        if !self.accounts.contains(&account) {
            return Err(DocError::Validation(format!(
                "account {} is not exposed by the wallet",
                account
            )));
        }
        self.selected = Some(account);
        Ok(())
    }

    /// Apply an account-change notification. An empty list means the
    /// wallet revoked access.
    pub fn handle_accounts_changed(&mut self, accounts: Vec<Address>) {
        match accounts.first() {
            None => self.disconnect(),
            Some(first) => {
                self.selected = Some(*first);
                self.accounts = accounts.clone();
                self.publish(SessionEvent::AccountsChanged(accounts));
            }
        }
    }

    /// Apply a network-change notification.
    pub fn handle_network_changed(&mut self, network_id: u64) {
        self.network_id = Some(network_id);
        self.publish(SessionEvent::NetworkChanged(network_id));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn current_account(&self) -> Option<Address> {
        self.selected
    }

    pub fn current_network_id(&self) -> Option<u64> {
        self.network_id
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn is_connected(&self) -> bool {
        self.selected.is_some()
    }

    pub fn is_correct_network(&self) -> bool {
        self.network_id == Some(self.expected_network)
    }

    pub fn expected_network(&self) -> u64 {
        self.expected_network
    }

    pub(crate) fn key_holder(&self) -> &dyn KeyHolder {
        self.key_holder.as_ref()
    }

    fn publish(&self, event: SessionEvent) {
        // no receivers is the normal case
        let _ = self.events.send(event);
    }
}

/// Decides whether a signing request is approved
pub type ConsentFn = dyn Fn(&Address, &Digest) -> bool + Send + Sync;

/// Key holder backed by in-process secp256k1 keys.
pub struct LocalKeyHolder {
    keys: Vec<(Address, SigningKey)>,
    network_id: u64,
    consent: Option<Box<ConsentFn>>,
    reachable: AtomicBool,
}

impl LocalKeyHolder {
    pub fn new(keys: Vec<SigningKey>, network_id: u64) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| (crypto::address_of(&key), key))
            .collect();
        Self {
            keys,
            network_id,
            consent: None,
            reachable: AtomicBool::new(true),
        }
    }

    pub fn from_hex(private_key: &str, network_id: u64) -> Result<Self> {
        Ok(Self::new(vec![crypto::signing_key_from_hex(private_key)?], network_id))
    }

    /// Install a consent hook; returning `false` declines the request.
    pub fn with_consent<F>(mut self, consent: F) -> Self
    where
        F: Fn(&Address, &Digest) -> bool + Send + Sync + 'static,
    {
        self.consent = Some(Box::new(consent));
        self
    }

    /// Simulate losing the channel to the holder.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DocError::Transport("key holder is unreachable".into()))
        }
    }
}

#[async_trait]
impl KeyHolder for LocalKeyHolder {
    async fn accounts(&self) -> Result<Vec<Address>> {
        self.ensure_reachable()?;
        Ok(self.keys.iter().map(|(address, _)| *address).collect())
    }

    async fn network_id(&self) -> Result<u64> {
        self.ensure_reachable()?;
        Ok(self.network_id)
    }

    async fn sign_digest(&self, account: &Address, digest: &Digest) -> Result<Signature> {
        self.ensure_reachable()?;
        let key = self
            .keys
            .iter()
            .find(|(address, _)| address == account)
            .map(|(_, key)| key)
            .ok_or(DocError::NoActiveSession)?;

        if let Some(consent) = &self.consent {
            if !consent(account, digest) {
                debug!(%account, %digest, "signing request declined");
                return Err(DocError::UserRejected);
            }
        }

        crypto::sign_digest(key, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;

    fn holder_with(count: usize, network_id: u64) -> LocalKeyHolder {
        let keys = (0..count)
            .map(|_| SigningKey::random(&mut rand::rngs::OsRng))
            .collect();
        LocalKeyHolder::new(keys, network_id)
    }

    #[tokio::test]
    async fn test_connect_selects_first_account() {
        let holder = Arc::new(holder_with(2, DEFAULT_NETWORK_ID));
        let accounts = holder.accounts().await.unwrap();
        let session = WalletSession::connect_to(holder, DEFAULT_NETWORK_ID)
            .await
            .unwrap();

        assert!(session.is_connected());
        assert!(session.is_correct_network());
        assert_eq!(session.current_account(), Some(accounts[0]));
        assert_eq!(session.accounts(), accounts.as_slice());
    }

    #[tokio::test]
    async fn test_wrong_network_detected() {
        let holder = Arc::new(holder_with(1, 1));
        let session = WalletSession::connect_to(holder, DEFAULT_NETWORK_ID)
            .await
            .unwrap();
        assert!(session.is_connected());
        assert!(!session.is_correct_network());
    }

    #[tokio::test]
    async fn test_connect_without_accounts_fails() {
        let mut mock = MockKeyHolder::new();
        mock.expect_accounts().returning(|| Ok(Vec::new()));
        mock.expect_network_id().never();

        let err = WalletSession::connect_to(Arc::new(mock), DEFAULT_NETWORK_ID)
            .await
            .err()
            .unwrap();
        assert_eq!(err, DocError::NoActiveSession);
    }

    #[tokio::test]
    async fn test_notifications_are_published() {
        let holder = Arc::new(holder_with(2, DEFAULT_NETWORK_ID));
        let mut session = WalletSession::connect_to(holder, DEFAULT_NETWORK_ID)
            .await
            .unwrap();
        let mut events = session.subscribe();

        session.handle_network_changed(1);
        assert!(!session.is_correct_network());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::NetworkChanged(1));

        session.handle_accounts_changed(Vec::new());
        assert!(!session.is_connected());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_select_unknown_account_rejected() {
        let holder = Arc::new(holder_with(1, DEFAULT_NETWORK_ID));
        let mut session = WalletSession::connect_to(holder, DEFAULT_NETWORK_ID)
            .await
            .unwrap();
        let stranger = crypto::address_of(&SigningKey::random(&mut rand::rngs::OsRng));
        assert!(matches!(
            session.select_account(stranger),
            Err(DocError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_consent_hook_declines() {
        let holder = holder_with(1, DEFAULT_NETWORK_ID).with_consent(|_, _| false);
        let account = holder.accounts().await.unwrap()[0];
        let err = holder
            .sign_digest(&account, &hash_bytes(b"hello"))
            .await
            .unwrap_err();
        assert_eq!(err, DocError::UserRejected);
    }

    #[tokio::test]
    async fn test_unreachable_holder_is_transport_error() {
        let holder = holder_with(1, DEFAULT_NETWORK_ID);
        holder.set_reachable(false);
        assert!(matches!(holder.accounts().await, Err(DocError::Transport(_))));
    }
}
