//! Common fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use alloy::primitives::Address;
use docsig::session::DEFAULT_NETWORK_ID;
use docsig::{crypto, LocalKeyHolder, MemoryRegistry, WalletSession};

/// Default development accounts
pub const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub fn address_of(key: &str) -> Address {
    crypto::address_of(&crypto::signing_key_from_hex(key).unwrap())
}

/// A connected session for `key` on the default network
pub async fn session_for(key: &str) -> WalletSession {
    let holder = LocalKeyHolder::from_hex(key, DEFAULT_NETWORK_ID).unwrap();
    WalletSession::connect_to(Arc::new(holder), DEFAULT_NETWORK_ID)
        .await
        .unwrap()
}

/// A registry handle that stores on behalf of `key`'s account
pub fn registry_for(base: &MemoryRegistry, key: &str) -> MemoryRegistry {
    base.connect(address_of(key))
}
