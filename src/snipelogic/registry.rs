//! Snipe configuration registry
//!
//! Owns the trigger rules and the watched-deployer set derived from them.
//! The watched set grows additively: removing a config does not prune the
//! addresses it contributed, since another rule may have added the same
//! deployer. Precise unwatching would need per-address reference counting;
//! until a rule needs it, `remove_watched` is the manual escape hatch.

use std::collections::HashSet;

use ethers::types::Address;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{parse_address, SnipeConfig, TargetFilter};

/// Registry of snipe rules plus the deployer watch list.
pub struct ConfigRegistry {
    configs: RwLock<Vec<SnipeConfig>>,
    watched: RwLock<HashSet<Address>>,
}

impl ConfigRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(Vec::new()),
            watched: RwLock::new(HashSet::new()),
        }
    }

    /// Store a rule. A specific deployer filter joins the watch list.
    pub async fn add(&self, config: SnipeConfig) {
        if let TargetFilter::Specific(deployer) = config.target_deployer {
            self.watched.write().await.insert(deployer);
        }
        info!(id = %config.id, dex = %config.dex, "snipe config added");
        self.configs.write().await.push(config);
    }

    /// Delete a rule by id. The watch list is left untouched.
    pub async fn remove(&self, id: &str) -> bool {
        let mut configs = self.configs.write().await;
        let before = configs.len();
        configs.retain(|c| c.id != id);
        let removed = configs.len() != before;
        if removed {
            info!(id, "snipe config removed");
        }
        removed
    }

    /// Clear a rule's enabled flag. Used by the fire-once policy.
    pub async fn disable(&self, id: &str) {
        let mut configs = self.configs.write().await;
        if let Some(config) = configs.iter_mut().find(|c| c.id == id) {
            config.enabled = false;
            debug!(id, "snipe config disabled");
        }
    }

    /// Snapshot of every rule in insertion order.
    pub async fn list(&self) -> Vec<SnipeConfig> {
        self.configs.read().await.clone()
    }

    /// Number of enabled rules.
    pub async fn enabled_count(&self) -> usize {
        self.configs.read().await.iter().filter(|c| c.enabled).count()
    }

    /// Add a deployer to the watch list. Idempotent.
    pub async fn add_watched(&self, address: Address) {
        self.watched.write().await.insert(address);
    }

    /// Remove a deployer from the watch list.
    pub async fn remove_watched(&self, address: Address) -> bool {
        self.watched.write().await.remove(&address)
    }

    /// Case-insensitive membership test on a hex address string.
    pub async fn is_watched(&self, address: &str) -> bool {
        match parse_address(address) {
            Ok(parsed) => self.watched.read().await.contains(&parsed),
            Err(_) => {
                debug!(address, "unparseable address in watch lookup");
                false
            }
        }
    }

    /// Watched deployers as lowercase hex strings.
    pub async fn list_watched(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .watched
            .read()
            .await
            .iter()
            .map(|a| format!("{:?}", a))
            .collect();
        all.sort();
        all
    }

    /// Number of watched deployers.
    pub async fn watched_count(&self) -> usize {
        self.watched.read().await.len()
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}
