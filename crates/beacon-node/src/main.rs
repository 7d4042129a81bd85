//! Beacon Node CLI
//!
//! Command-line interface for running beacon node operations:
//! - Operator key management and signing
//! - Pedersen commitments for DKG
//! - Group membership inspection
//! - A local relay round simulation

use anyhow::{anyhow, Context, Result};
use beacon_core::chain::{BlockCounter, LocalChain, RelayChain};
use beacon_core::commitment::{self, Commitment, DecommitmentKey, Parameters};
use beacon_core::dkg::{
    DkgResult, DkgResultHashSignatureMessage, DkgResultHasher, DkgResultsVotes, Keccak256Hasher,
};
use beacon_core::net::NetworkIdentity;
use beacon_core::operator::{self, PrivateKey};
use beacon_core::registry::Groups;
use beacon_core::relay::Node;
use beacon_core::{ChainConfig, MemberIndex, ThresholdSigner, DEFAULT_RELAY_ENTRY_TIMEOUT};
use beacon_persistence::DiskHandle;
use clap::{Parser, Subcommand};
use k256::elliptic_curve::{sec1::ToEncodedPoint, Field};
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};

const OPERATOR_KEY_FILE: &str = "operator.key.json";
const PARAMETERS_FILE: &str = "commitment_params.json";
const COMMITMENT_FILE: &str = "commitment.json";
const STORAGE_DIR: &str = "storage";

/// Beacon Node - threshold relay random beacon
#[derive(Parser)]
#[command(name = "beacon-node")]
#[command(about = "Threshold relay random beacon node")]
#[command(version)]
struct Cli {
    /// Data directory for keys, parameters and group memberships
    #[arg(short, long, env = "BEACON_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Blocks the active group has to submit a relay entry
    #[arg(long, env = "RELAY_ENTRY_TIMEOUT", default_value_t = DEFAULT_RELAY_ENTRY_TIMEOUT)]
    relay_entry_timeout: u64,

    /// Block time of the local chain, in milliseconds
    #[arg(long, env = "BLOCK_TIME_MS", default_value_t = 500)]
    block_time_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store a new operator key
    OperatorKey {
        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Sign a message with the operator key
    Sign {
        /// Message to sign; its SHA-256 digest is signed
        #[arg(short, long)]
        message: String,
    },

    /// Verify an operator signature
    Verify {
        /// Signed message
        #[arg(short, long)]
        message: String,

        /// Hex encoded signature, 64 or 65 bytes
        #[arg(short, long)]
        signature: String,

        /// Hex encoded signer public key; defaults to the stored operator key
        #[arg(short, long)]
        public_key: Option<String>,
    },

    /// Generate Pedersen commitment parameters
    Params,

    /// Commit to a secret
    Commit {
        /// Secret to commit to
        #[arg(short, long)]
        secret: String,
    },

    /// Open the stored commitment with a revealed secret
    Open {
        /// Revealed secret
        #[arg(short, long)]
        secret: String,
    },

    /// List persisted group memberships
    Groups,

    /// Run a relay round against a local chain
    Simulate {
        /// Group size
        #[arg(long, default_value_t = 5)]
        members: MemberIndex,

        /// Submit the relay entry this many blocks after the request
        #[arg(long)]
        submit_after: Option<u64>,

        /// Retire groups left over from previous runs
        #[arg(long)]
        retire_previous: bool,
    },
}

/// Operator key as stored on disk
#[derive(Serialize, Deserialize)]
struct OperatorKeyFile {
    private_key: String,
    public_key: String,
}

/// Commitment and its opening as stored on disk
#[derive(Serialize, Deserialize)]
struct CommitmentFile {
    commitment: Commitment,
    decommitment_key: DecommitmentKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    // Ensure data directory exists
    std::fs::create_dir_all(&cli.data_dir)?;

    match cli.command {
        Commands::OperatorKey { force } => {
            generate_operator_key(&cli, force)?;
        }
        Commands::Sign { ref message } => {
            sign_message(&cli, message)?;
        }
        Commands::Verify {
            ref message,
            ref signature,
            ref public_key,
        } => {
            verify_message(&cli, message, signature, public_key.as_deref())?;
        }
        Commands::Params => {
            generate_parameters(&cli)?;
        }
        Commands::Commit { ref secret } => {
            commit(&cli, secret)?;
        }
        Commands::Open { ref secret } => {
            open(&cli, secret)?;
        }
        Commands::Groups => {
            show_groups(&cli).await?;
        }
        Commands::Simulate {
            members,
            submit_after,
            retire_previous,
        } => {
            simulate(&cli, members, submit_after, retire_previous).await?;
        }
    }

    Ok(())
}

fn chain_config(cli: &Cli) -> ChainConfig {
    ChainConfig {
        relay_entry_timeout: cli.relay_entry_timeout,
        block_time_ms: cli.block_time_ms,
    }
}

fn generate_operator_key(cli: &Cli, force: bool) -> Result<()> {
    let path = cli.data_dir.join(OPERATOR_KEY_FILE);
    if path.exists() && !force {
        return Err(anyhow!(
            "operator key already exists at {}, use --force to replace it",
            path.display()
        ));
    }

    let (private_key, public_key) = operator::generate_key_pair(&mut OsRng);
    let key_file = OperatorKeyFile {
        private_key: hex::encode(private_key.to_bytes()),
        public_key: hex::encode(operator::public_key_to_bytes(&public_key)),
    };
    write_json(&path, &key_file)?;

    let identity = NetworkIdentity::new(public_key);
    info!(path = ?path, peer_id = %identity, "Operator key generated");

    println!("Public Key: {}", key_file.public_key);
    println!("Peer ID: {}", identity);

    Ok(())
}

fn sign_message(cli: &Cli, message: &str) -> Result<()> {
    let private_key = load_operator_key(cli)?;
    let hash = Sha256::digest(message.as_bytes());

    let signature = operator::sign(&hash, &private_key)?;

    println!("Signature: {}", hex::encode(signature));

    Ok(())
}

fn verify_message(
    cli: &Cli,
    message: &str,
    signature: &str,
    public_key: Option<&str>,
) -> Result<()> {
    let public_key = match public_key {
        Some(public_key) => operator::public_key_from_bytes(&hex::decode(public_key)?)?,
        None => *load_operator_key(cli)?.verifying_key(),
    };

    let hash = Sha256::digest(message.as_bytes());
    let signature = hex::decode(signature)?;

    match operator::verify_signature(&public_key, &hash, &signature) {
        Ok(()) => println!("Signature valid"),
        Err(e) => {
            println!("Signature invalid: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn generate_parameters(cli: &Cli) -> Result<()> {
    info!("Generating commitment parameters");

    let parameters = Parameters::generate()?;

    let path = cli.data_dir.join(PARAMETERS_FILE);
    write_json(&path, &parameters)?;

    info!(path = ?path, "Commitment parameters saved");
    println!("Parameters: {}", path.display());

    Ok(())
}

fn commit(cli: &Cli, secret: &str) -> Result<()> {
    let parameters: Parameters = read_json(&cli.data_dir.join(PARAMETERS_FILE))
        .context("commitment parameters missing, run `params` first")?;

    let (commitment, decommitment_key) = commitment::generate(&parameters, secret.as_bytes())?;

    let path = cli.data_dir.join(COMMITMENT_FILE);
    let commitment_file = CommitmentFile {
        commitment,
        decommitment_key,
    };
    write_json(&path, &commitment_file)?;

    println!(
        "Commitment: {}",
        hex::encode(commitment_file.commitment.to_bytes_be())
    );

    Ok(())
}

fn open(cli: &Cli, secret: &str) -> Result<()> {
    let parameters: Parameters = read_json(&cli.data_dir.join(PARAMETERS_FILE))?;
    let commitment_file: CommitmentFile = read_json(&cli.data_dir.join(COMMITMENT_FILE))?;

    let valid = commitment_file.commitment.verify(
        &parameters,
        &commitment_file.decommitment_key,
        secret.as_bytes(),
    );

    if !valid {
        return Err(anyhow!("secret does not open the commitment"));
    }

    println!("Commitment opened");

    Ok(())
}

async fn show_groups(cli: &Cli) -> Result<()> {
    let chain = LocalChain::new(chain_config(cli));
    let groups = open_registry(cli, &chain)?;
    groups.load_from_storage().await?;

    let group_public_keys = groups.group_public_keys().await;
    println!("Groups: {}", group_public_keys.len());

    for group_public_key in group_public_keys {
        println!("  {}", hex::encode(&group_public_key));
        for membership in groups.get_group(&group_public_key).await {
            println!(
                "    member {} on {}",
                membership.signer.member_index(),
                membership.channel_name
            );
        }
    }

    Ok(())
}

async fn simulate(
    cli: &Cli,
    members: MemberIndex,
    submit_after: Option<u64>,
    retire_previous: bool,
) -> Result<()> {
    if members == 0 {
        return Err(anyhow!("group needs at least one member"));
    }

    let chain = LocalChain::new(chain_config(cli));
    let block_counter = chain.block_counter();

    let groups = open_registry(cli, &chain)?;
    groups.load_from_storage().await?;

    if retire_previous {
        for group_public_key in groups.group_public_keys().await {
            chain.mark_stale(&group_public_key);
        }
        groups.unregister_deleted_groups().await;
    }

    let (group_public_key, signers) = run_group_setup(members)?;
    let channel_name = format!("group-{}", hex::encode(&group_public_key[..8]));
    for signer in signers {
        groups.register_group(signer, &channel_name).await?;
    }

    info!(
        group_public_key = hex::encode(&group_public_key),
        members,
        "Group registered"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = chain.spawn_miner(shutdown_rx.clone());

    let node = Node::with_shutdown(block_counter.clone(), shutdown_rx);
    let start_block = block_counter.current_block().await?;
    let config = chain.config();
    let monitor = node.monitor_relay_entry(Arc::new(chain.clone()), start_block, config);

    info!(start_block, relay_entry_timeout = config.relay_entry_timeout, "Relay entry requested");

    if let Some(submit_after) = submit_after {
        let chain = chain.clone();
        let block_counter = Arc::clone(&block_counter);
        let submit_at = start_block + submit_after;
        tokio::spawn(async move {
            if let Err(e) = submit_entry(&chain, block_counter.as_ref(), submit_at).await {
                warn!(error = %e, "Relay entry submission failed");
            }
        });
    }

    let outcome = tokio::select! {
        outcome = monitor => outcome??,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            shutdown_tx.send(true)?;
            ticker.await?;
            return Ok(());
        }
    };

    shutdown_tx.send(true)?;
    ticker.await?;

    println!("Outcome: {:?}", outcome);
    println!("Relay entries: {}", chain.relay_entries().len());
    println!(
        "Timeout reports: {:?}",
        chain.get_report_relay_entry_timeouts()
    );

    Ok(())
}

/// Simulated DKG run: deal Shamir shares of a random group key, let every
/// member vote on the result and check the votes agree.
fn run_group_setup(members: MemberIndex) -> Result<(Vec<u8>, Vec<ThresholdSigner>)> {
    let threshold = usize::from(members) / 2 + 1;
    let coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(&mut OsRng)).collect();

    let group_public_key = (ProjectivePoint::GENERATOR * coefficients[0])
        .to_affine()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec();

    let result = DkgResult::new(group_public_key.clone(), Vec::new());
    let result_hash = Keccak256Hasher.hash(&result);

    let mut votes = DkgResultsVotes::new();
    let mut signers = Vec::with_capacity(usize::from(members));

    for member_index in 1..=members {
        let share = evaluate_polynomial(&coefficients, member_index);
        signers.push(ThresholdSigner::new(
            member_index,
            group_public_key.clone(),
            &share,
        ));

        let (operator_key, operator_public_key) = operator::generate_key_pair(&mut OsRng);
        let message = DkgResultHashSignatureMessage::sign(member_index, result_hash, &operator_key)?;
        message.verify(&operator_public_key)?;
        votes.add_vote(message.result_hash);
    }

    match votes.leading_result() {
        Some((hash, count)) if hash == result_hash => {
            info!(result_hash = %hash, votes = count, "DKG result agreed");
        }
        _ => return Err(anyhow!("members did not agree on a DKG result")),
    }

    Ok((group_public_key, signers))
}

fn evaluate_polynomial(coefficients: &[Scalar], member_index: MemberIndex) -> Scalar {
    let x = Scalar::from(u64::from(member_index));
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coefficient| acc * x + coefficient)
}

async fn submit_entry(
    chain: &LocalChain,
    block_counter: &dyn BlockCounter,
    height: u64,
) -> beacon_core::Result<()> {
    block_counter.wait_for_block_height(height).await?;

    let mut entry = [0u8; 32];
    OsRng.fill_bytes(&mut entry);
    chain.submit_relay_entry(&entry).await
}

fn open_registry(cli: &Cli, chain: &LocalChain) -> Result<Groups> {
    let handle = DiskHandle::new(cli.data_dir.join(STORAGE_DIR))?;
    Ok(Groups::new(Arc::new(chain.clone()), Arc::new(handle)))
}

fn load_operator_key(cli: &Cli) -> Result<PrivateKey> {
    let key_file: OperatorKeyFile = read_json(&cli.data_dir.join(OPERATOR_KEY_FILE))
        .context("operator key missing, run `operator-key` first")?;
    Ok(operator::private_key_from_bytes(&hex::decode(key_file.private_key)?)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
