//! `acl-replay`: rebuild a permission state from an event history, or plan a
//! call against it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use org_acl_kernel::hashing::canonical_serialize;
use org_acl_kernel::StaticRegistry;
use org_acl_runtime::oracle::StaticOracle;
use org_acl_runtime::replay::{load_batch, rebuild_state, verify_determinism};
use org_acl_runtime::{Organization, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "acl-replay", version, about = "Replay permission events and plan calls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fold an event history and print the canonical state and its hash
    Replay {
        #[arg(long)]
        events: PathBuf,
    },
    /// Resolve the execution plan for one call and print its transactions
    Resolve {
        #[arg(long)]
        events: PathBuf,
        /// JSON registry: {"entities": [...]}
        #[arg(long)]
        registry: PathBuf,
        /// JSON acceptance table: {"accepts": [{"forwarder", "sender"}]}
        #[arg(long)]
        oracle: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        root: String,
        #[arg(long)]
        sender: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        method: String,
        /// JSON array of call arguments
        #[arg(long, default_value = "[]")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay { events } => replay(&events),
        Commands::Resolve {
            events,
            registry,
            oracle,
            config,
            root,
            sender,
            target,
            method,
            args,
        } => {
            let args: Vec<Value> =
                serde_json::from_str(&args).context("--args must be a JSON array")?;
            let config = match config {
                Some(path) => RuntimeConfig::load(&path)?,
                None => RuntimeConfig::default(),
            };
            let registry: StaticRegistry = read_json(&registry)?;
            let oracle: StaticOracle = match oracle {
                Some(path) => read_json(&path)?,
                None => StaticOracle::default(),
            };

            let org = Organization::connect(
                &root,
                Arc::new(StaticRegistry::new(registry.entities)),
                Arc::new(oracle),
                &config,
            )?;
            org.ingest(load_batch(&events)?).await?;
            org.flush().await?;
            let outcome = org.resolve_intent(&sender, &target, &method, args).await;
            org.shutdown().await;

            let plan = outcome?;
            println!("{}", serde_json::to_string_pretty(&plan.to_transactions())?);
            Ok(())
        }
    }
}

fn replay(events: &Path) -> Result<()> {
    let batch = load_batch(events)?;
    let hash = verify_determinism(&batch)?;
    let (state, _) = rebuild_state(&batch);
    let canonical = String::from_utf8(canonical_serialize(&state))
        .context("canonical state is not UTF-8")?;
    println!("{canonical}");
    println!("hash: {hash}");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
