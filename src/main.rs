/// Pairsniper - Main entry point
///
/// Loads the engine configuration, wires the chain collaborators and runs
/// the sniping engine until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use pairsniper::chain_adapters::evm_adapter::{EvmAdapter, WalletSigner};
use pairsniper::chain_adapters::TxSigner;
use pairsniper::{greeting, init_logging, load_config, save_config, EngineConfig, SnipeEngine, SniperEvent};

/// Environment variable holding the hot wallet's private key.
const PRIVATE_KEY_ENV: &str = "PAIRSNIPER_PRIVATE_KEY";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/pairsniper.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand)]
enum Commands {
    /// Generate default configuration
    Init,

    /// Run the engine
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;
    println!("{}", greeting());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => init_config(&cli.config),
        Commands::Run => run_engine(&cli.config).await,
    }
}

/// Write a default configuration file
fn init_config(path: &str) -> Result<()> {
    let config = EngineConfig::default();
    save_config(path, &config)?;
    info!("Default configuration written to {}", path);
    info!("Edit the file, set {} and run the engine", PRIVATE_KEY_ENV);
    Ok(())
}

/// Run the engine until Ctrl+C
async fn run_engine(path: &str) -> Result<()> {
    let config = load_config(path)?;
    let chain_id = config.chain.chain_id;
    info!(
        "Configuration loaded for chain {} ({})",
        config.chain.name, chain_id
    );

    let adapter = EvmAdapter::connect(&config.chain).await?;
    let signer: Arc<dyn TxSigner> = {
        let key = std::env::var(PRIVATE_KEY_ENV)
            .with_context(|| format!("{} is not set", PRIVATE_KEY_ENV))?;
        Arc::new(WalletSigner::new(&key, chain_id)?)
    };

    let startup_snipes = config.snipes.clone();
    let default_multiplier = config.gas.gas_multiplier;
    let engine = Arc::new(SnipeEngine::new(adapter.clone(), adapter, config)?);

    // Arm the rules declared in the config file, pre-signing one payload per
    // rule so dispatch has something to fire.
    for entry in &startup_snipes {
        let rule = entry.to_snipe_config(default_multiplier)?;
        match engine.create_presigned(&rule, signer.clone()).await {
            Ok(presigned) => info!(
                "Armed rule {} with pre-signed transaction {}",
                rule.id, presigned.id
            ),
            Err(e) => warn!("Failed to pre-sign payload for rule {}: {}", rule.id, e),
        }
        engine.add_config(rule).await;
    }

    spawn_event_logger(engine.clone());
    engine.start().await?;

    let status = engine.status().await;
    info!(
        "Engine running: {} ready payloads, {} pending rules",
        status.ready_count, status.pending_config_count
    );

    wait_for_shutdown().await;
    engine.stop().await;
    info!("Engine stopped");
    Ok(())
}

/// Mirror lifecycle events into the log
fn spawn_event_logger(engine: Arc<SnipeEngine>) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                SniperEvent::LiquiditySniped(outcome) => info!(
                    "sniped {:?} in {} ms (tx {:?})",
                    outcome.token, outcome.latency_ms, outcome.tx_hash
                ),
                SniperEvent::PresignedFailed { id, error } => {
                    warn!("pre-signed transaction {} failed: {}", id, error)
                }
                other => info!("event: {}", other.kind()),
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C)
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
