//! `DocumentRegistry` contract client over JSON-RPC

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, FixedBytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{is_duplicate_reason, Registry, StoredRecord, TxReceipt};
use crate::config::RegistryConfig;
use crate::crypto::Signature;
use crate::error::{DocError, Result};
use crate::hasher::Digest;

// Generate contract bindings
sol! {
    #[sol(rpc)]
    interface IDocumentRegistry {
        struct Document {
            bytes32 hash;
            address signer;
            uint256 timestamp;
            bytes signature;
        }

        function storeDocumentHash(bytes32 hash, uint256 timestamp, bytes calldata signature) external;

        function isDocumentStored(bytes32 hash) external view returns (bool);

        function getDocumentInfo(bytes32 hash) external view returns (Document memory);

        function verifyDocument(bytes32 hash, address signer, bytes calldata signature) external view returns (bool);
    }
}

/// Registry backed by a deployed contract
pub struct EvmRegistry {
    config: RegistryConfig,
}

impl EvmRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    pub fn registry_address(&self) -> Address {
        self.config.registry_address
    }

    fn to_bytes32(digest: &Digest) -> FixedBytes<32> {
        FixedBytes::from_slice(digest.as_bytes())
    }

    /// Network the RPC endpoint is serving
    pub async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| DocError::Validation(format!("Invalid RPC URL: {}", e)))?,
        );

        provider
            .get_chain_id()
            .await
            .map_err(|e| DocError::Remote(format!("Failed to read chain id: {}", e)))
    }

    fn signer(&self) -> Result<PrivateKeySigner> {
        let key = self.config.private_key.as_deref().ok_or_else(|| {
            DocError::Validation("a private key is required to send transactions".into())
        })?;
        key.trim()
            .parse()
            .map_err(|e| DocError::Validation(format!("Invalid private key: {}", e)))
    }
}

/// Split a contract error into the duplicate-store case and the rest.
fn classify_store_error(digest: &Digest, message: String) -> DocError {
    if is_duplicate_reason(&message) {
        DocError::AlreadyExists(digest.to_hex())
    } else {
        DocError::Remote(message)
    }
}

#[async_trait]
impl Registry for EvmRegistry {
    async fn store(&self, digest: &Digest, timestamp: u64, signature: &Signature) -> Result<TxReceipt> {
        info!(
            "Storing document {} in registry {} (timestamp {})",
            digest, self.config.registry_address, timestamp
        );

        let signer = self.signer()?;

        // Create provider with signer and recommended fillers
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| DocError::Validation(format!("Invalid RPC URL: {}", e)))?,
            );

        let contract = IDocumentRegistry::new(self.config.registry_address, &provider);

        let tx = contract.storeDocumentHash(
            Self::to_bytes32(digest),
            U256::from(timestamp),
            Bytes::copy_from_slice(signature.as_bytes()),
        );

        // gas estimation surfaces the revert reason before anything is sent
        let pending = tx
            .send()
            .await
            .map_err(|e| classify_store_error(digest, format!("Failed to send transaction: {}", e)))?;

        info!("Transaction sent: {:?}", pending.tx_hash());

        // Wait for confirmation
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| DocError::Remote(format!("Failed to get receipt: {}", e)))?;

        if !receipt.status() {
            warn!("Store transaction {} reverted", receipt.transaction_hash);
            return Err(DocError::Remote(format!(
                "transaction {} reverted",
                receipt.transaction_hash
            )));
        }

        info!(
            "Document {} stored in tx {} (block {})",
            digest,
            receipt.transaction_hash,
            receipt.block_number.unwrap_or(0)
        );

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }

    async fn exists(&self, digest: &Digest) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| DocError::Validation(format!("Invalid RPC URL: {}", e)))?,
        );

        let contract = IDocumentRegistry::new(self.config.registry_address, &provider);

        let result = contract
            .isDocumentStored(Self::to_bytes32(digest))
            .call()
            .await
            .map_err(|e| DocError::Remote(format!("Contract call failed: {}", e)))?;

        debug!(%digest, stored = result._0, "isDocumentStored");
        Ok(result._0)
    }

    async fn fetch(&self, digest: &Digest) -> Result<StoredRecord> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| DocError::Validation(format!("Invalid RPC URL: {}", e)))?,
        );

        let contract = IDocumentRegistry::new(self.config.registry_address, &provider);

        let result = contract
            .getDocumentInfo(Self::to_bytes32(digest))
            .call()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.to_lowercase().contains("not found") {
                    DocError::NotFound(digest.to_hex())
                } else {
                    DocError::Remote(format!("Contract call failed: {}", message))
                }
            })?;

        let document = result._0;
        // an unset slot decodes as the zero address
        if document.signer == Address::ZERO {
            return Err(DocError::NotFound(digest.to_hex()));
        }

        let timestamp = u64::try_from(document.timestamp).map_err(|_| {
            DocError::Remote(format!("timestamp out of range: {}", document.timestamp))
        })?;

        Ok(StoredRecord {
            digest: *digest,
            signer: document.signer,
            timestamp,
            signature: Signature::from_bytes(document.signature.to_vec()),
        })
    }

    async fn verify_remote(
        &self,
        digest: &Digest,
        claimed_signer: &Address,
        signature: &Signature,
    ) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| DocError::Validation(format!("Invalid RPC URL: {}", e)))?,
        );

        let contract = IDocumentRegistry::new(self.config.registry_address, &provider);

        let valid = contract
            .verifyDocument(
                Self::to_bytes32(digest),
                *claimed_signer,
                Bytes::copy_from_slice(signature.as_bytes()),
            )
            .call()
            .await
            .map_err(|e| DocError::Remote(format!("Contract call failed: {}", e)))?;

        debug!(%digest, %claimed_signer, valid = valid._0, "verifyDocument");
        Ok(valid._0)
    }
}
