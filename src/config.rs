//! Registry connection settings
//!
//! Values come from explicit overrides first, then from the environment:
//!
//! | variable                  | meaning                              |
//! |---------------------------|--------------------------------------|
//! | `DOCSIG_RPC_URL`          | JSON-RPC endpoint of the node         |
//! | `DOCSIG_REGISTRY_ADDRESS` | deployed `DocumentRegistry` contract  |
//! | `DOCSIG_CHAIN_ID`         | expected network (default 31337)      |
//! | `DOCSIG_PRIVATE_KEY`      | wallet key for signing and storing    |

use alloy::primitives::Address;

use crate::error::{DocError, Result};
use crate::session::DEFAULT_NETWORK_ID;

pub const ENV_RPC_URL: &str = "DOCSIG_RPC_URL";
pub const ENV_REGISTRY_ADDRESS: &str = "DOCSIG_REGISTRY_ADDRESS";
pub const ENV_CHAIN_ID: &str = "DOCSIG_CHAIN_ID";
pub const ENV_PRIVATE_KEY: &str = "DOCSIG_PRIVATE_KEY";

/// Registry service configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// RPC URL for the chain hosting the registry
    pub rpc_url: String,
    /// DocumentRegistry contract address
    pub registry_address: Address,
    /// Network the wallet must be on
    pub chain_id: u64,
    /// Private key for signing digests and transactions
    pub private_key: Option<String>,
}

/// Values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub registry_address: Option<String>,
    pub chain_id: Option<u64>,
    pub private_key: Option<String>,
}

impl RegistryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::resolve(ConfigOverrides::default())
    }

    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    fn resolve_with<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = overrides
            .rpc_url
            .or_else(|| lookup(ENV_RPC_URL))
            .ok_or_else(|| missing(ENV_RPC_URL))?;

        let registry_address = overrides
            .registry_address
            .or_else(|| lookup(ENV_REGISTRY_ADDRESS))
            .ok_or_else(|| missing(ENV_REGISTRY_ADDRESS))?;
        let registry_address = crate::address::normalize(&registry_address).map_err(|_| {
            DocError::Validation(format!(
                "{} is not a valid address: '{}'",
                ENV_REGISTRY_ADDRESS, registry_address
            ))
        })?;

        let chain_id = match overrides.chain_id {
            Some(id) => id,
            None => match lookup(ENV_CHAIN_ID) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    DocError::Validation(format!("{} must be an integer: '{}'", ENV_CHAIN_ID, raw))
                })?,
                None => DEFAULT_NETWORK_ID,
            },
        };

        let private_key = overrides.private_key.or_else(|| lookup(ENV_PRIVATE_KEY));

        Ok(Self {
            rpc_url,
            registry_address,
            chain_id,
            private_key,
        })
    }
}

fn missing(name: &str) -> DocError {
    DocError::Validation(format!("{} is not set", name))
}
