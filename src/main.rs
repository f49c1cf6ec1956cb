//! docsig CLI

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use docsig::config::{ConfigOverrides, RegistryConfig};
use docsig::flow::now_timestamp;
use docsig::telemetry::{init_tracing, TelemetryConfig};
use docsig::verifier::{Evaluation, VerificationVerdict};
use docsig::{
    address, hasher, DocError, DocumentSigner, DocumentVerifier, EvmRegistry, LocalKeyHolder,
    WalletSession,
};

#[derive(Debug, Parser)]
#[command(name = "docsig", version, about = "Sign documents into an on-chain registry and verify them")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON-RPC endpoint (DOCSIG_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// DocumentRegistry contract address (DOCSIG_REGISTRY_ADDRESS)
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Network the wallet must be on (DOCSIG_CHAIN_ID, default 31337)
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Wallet private key (DOCSIG_PRIVATE_KEY)
    #[arg(long, global = true)]
    private_key: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the Keccak-256 digest of a file
    Hash { file: PathBuf },
    /// Print the checksummed form of an address
    Address { address: String },
    /// Hash a file, sign the digest and store it in the registry
    Sign {
        file: PathBuf,
        /// Only sign; do not send a transaction
        #[arg(long)]
        no_store: bool,
        /// Timestamp to record, in seconds since the epoch (default: now)
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Verify a file against the registry and an expected signer
    Verify {
        file: PathBuf,
        /// Address that is expected to have signed the file
        #[arg(long)]
        signer: String,
    },
    /// Show connection status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&TelemetryConfig::from_env().verbose(cli.verbose));

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(err) if err.is_benign() => {
            report_benign(&cli, &err);
            0
        }
        Err(err) => {
            if cli.json {
                println!("{}", json!({ "error": err.code(), "message": err.to_string() }));
            } else {
                eprintln!("Error: {}", err);
            }
            1
        }
    };
    process::exit(code);
}

async fn run(cli: &Cli) -> docsig::Result<i32> {
    match &cli.command {
        Command::Hash { file } => {
            let digest = hasher::hash_file(file).await?;
            if cli.json {
                println!("{}", json!({ "file": file, "digest": digest }));
            } else {
                println!("{}", digest);
            }
            Ok(0)
        }
        Command::Address { address } => {
            let normalized = address::normalize_str(address)?;
            if cli.json {
                println!("{}", json!({ "address": normalized }));
            } else {
                println!("{}", normalized);
            }
            Ok(0)
        }
        Command::Sign {
            file,
            no_store,
            timestamp,
        } => {
            let (registry, session) = connect(cli).await?;
            let mut flow = DocumentSigner::new(&session, &registry);
            let digest = flow.load_file(file).await?;
            let signature = flow.sign().await?.clone();

            if *no_store {
                if cli.json {
                    println!("{}", json!({ "digest": digest, "signature": signature }));
                } else {
                    println!("Digest:    {}", digest);
                    println!("Signature: {}", signature);
                }
                return Ok(0);
            }

            let timestamp = timestamp.unwrap_or_else(now_timestamp);
            let receipt = flow.store(timestamp).await?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "digest": digest,
                        "signature": signature,
                        "timestamp": timestamp,
                        "receipt": receipt,
                    })
                );
            } else {
                println!("✅ Document stored");
                println!("  Digest:    {}", digest);
                println!("  Signature: {}", signature);
                println!("  Tx:        {}", receipt.tx_hash);
                if let Some(block) = receipt.block_number {
                    println!("  Block:     {}", block);
                }
            }
            Ok(0)
        }
        Command::Verify { file, signer } => {
            let (registry, session) = connect(cli).await?;
            let mut flow = DocumentVerifier::new(&session, &registry);
            flow.load_file(file).await?;
            let attempt = flow.verify(signer).await;

            match &attempt.verdict {
                VerificationVerdict::Evaluated(evaluation) => {
                    print_evaluation(cli, evaluation);
                    Ok(if evaluation.is_valid() { 0 } else { 1 })
                }
                VerificationVerdict::Failed(err) => Err(err.clone()),
                VerificationVerdict::Pending => Err(DocError::Validation(
                    "verification did not run".into(),
                )),
            }
        }
        Command::Status => {
            let config = RegistryConfig::resolve(overrides(cli))?;
            let registry = EvmRegistry::new(config.clone());
            let chain_id = registry.chain_id().await?;
            let account = match &config.private_key {
                Some(key) => Some(docsig::crypto::address_of(
                    &docsig::crypto::signing_key_from_hex(key)?,
                )),
                None => None,
            };

            if cli.json {
                println!(
                    "{}",
                    json!({
                        "rpc_url": config.rpc_url,
                        "registry": config.registry_address,
                        "chain_id": chain_id,
                        "expected_chain_id": config.chain_id,
                        "account": account,
                    })
                );
            } else {
                println!("\n📄 docsig");
                println!("=========");
                println!("RPC:       {}", config.rpc_url);
                println!("Registry:  {}", config.registry_address);
                println!(
                    "Network:   {} ({})",
                    chain_id,
                    if chain_id == config.chain_id { "ok" } else { "wrong network" }
                );
                match account {
                    Some(account) => println!("Account:   {}\n", account),
                    None => println!("Account:   not configured\n"),
                }
            }
            Ok(0)
        }
    }
}

fn overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        rpc_url: cli.rpc_url.clone(),
        registry_address: cli.registry.clone(),
        chain_id: cli.chain_id,
        private_key: cli.private_key.clone(),
    }
}

/// Build the registry client and a wallet session on the node's network.
async fn connect(cli: &Cli) -> docsig::Result<(EvmRegistry, WalletSession)> {
    let config = RegistryConfig::resolve(overrides(cli))?;
    let private_key = config
        .private_key
        .clone()
        .ok_or(DocError::NoActiveSession)?;
    let expected_network = config.chain_id;
    let registry = EvmRegistry::new(config);

    let network_id = registry.chain_id().await?;
    let holder = LocalKeyHolder::from_hex(&private_key, network_id)?;
    let session = WalletSession::connect_to(Arc::new(holder), expected_network).await?;
    Ok((registry, session))
}

fn print_evaluation(cli: &Cli, evaluation: &Evaluation) {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string(evaluation).unwrap_or_else(|e| e.to_string())
        );
        return;
    }

    let mark = |ok: bool| if ok { "✅ valid" } else { "❌ invalid" };
    let record = &evaluation.stored_record;
    let stored_at = chrono::DateTime::from_timestamp(record.timestamp as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| record.timestamp.to_string());

    println!("Digest:            {}", record.digest);
    println!("Signer on-chain:   {}", record.signer);
    println!("Stored at:         {}", stored_at);
    println!("Recovered address: {}", evaluation.recovered_address);
    println!("On-chain:          {}", mark(evaluation.on_chain_valid));
    println!("Off-chain:         {}", mark(evaluation.off_chain_valid));
    if let Some(mismatch) = &evaluation.signer_mismatch {
        println!("⚠️  {}", mismatch);
    }
    if evaluation.verdicts_disagree() {
        println!("⚠️  the registry and the local signature check disagree");
    }
}

fn report_benign(cli: &Cli, err: &DocError) {
    if cli.json {
        println!("{}", json!({ "status": err.code(), "message": err.to_string() }));
    } else {
        println!("ℹ️  {}. It does not need to be stored again.", err);
    }
}
