//! docsig: on-chain document notarization
//!
//! Hash a file, sign the digest with a wallet key, anchor
//! `(digest, signer, timestamp, signature)` in a registry contract, and
//! later verify a file both through the registry's own check and by
//! recovering the signer locally.

pub mod address;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod hasher;
pub mod registry;
pub mod session;
pub mod signer;
pub mod telemetry;
pub mod verifier;

pub use error::{DocError, Result};
pub use flow::{DocumentSigner, DocumentVerifier};
pub use hasher::Digest;
pub use registry::{EvmRegistry, MemoryRegistry, Registry, StoredRecord, TxReceipt};
pub use session::{KeyHolder, LocalKeyHolder, WalletSession};
pub use verifier::{VerificationEngine, VerificationVerdict};
