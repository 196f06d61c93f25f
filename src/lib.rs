//! Pairsniper Library
//!
//! Block-0 liquidity sniping engine for EVM chains. The engine watches a
//! chain for newly created trading pairs on known DEX factories and, when a
//! registered rule matches, immediately broadcasts a previously prepared
//! swap transaction, racing to be included as early as possible relative to
//! the liquidity-adding transaction.
//!
//! The crate is organized around one owning [`SnipeEngine`] per chain,
//! constructed from narrow collaborator traits for the block feed, the
//! broadcast path and the signer, so the whole decision core runs against
//! in-process doubles in tests.

pub mod chain_adapters;
pub mod config;
pub mod errors;
pub mod events;
pub mod snipelogic;
pub mod types;

pub use crate::chain_adapters::{ChainFeed, TxBroadcaster, TxSigner};
pub use crate::config::{load_config, save_config, EngineConfig};
pub use crate::errors::SnipeError;
pub use crate::events::{EventBus, SniperEvent};
pub use crate::snipelogic::SnipeEngine;
pub use crate::types::{
    EngineStatus, ExecuteResponse, PairCreatedEvent, PreSignedTransaction, PresignStatus,
    SnipeConfig, SnipeOutcome, TargetFilter,
};

use anyhow::{Context, Result};
use tracing::info;

/// Initialize logging
pub fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    info!("Logging initialized at {} level", log_level);
    Ok(())
}

/// Version information
pub mod version {
    /// Current version from Cargo.toml
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Get full version string
    pub fn full_version() -> String {
        format!("pairsniper v{}", VERSION)
    }
}

/// Get a greeting message with version info
pub fn greeting() -> String {
    format!("{} starting up", version::full_version())
}
