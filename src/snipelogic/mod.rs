//! Sniping engine core
//!
//! Wires the monitor, decoder, store, registry, dispatcher and executor
//! together behind one owning type. The engine is constructed explicitly
//! from its chain collaborators, so every piece of behavior is reachable
//! with in-process test doubles.

pub mod decoder;
pub mod dispatch;
pub mod monitor;
pub mod presign;
pub mod registry;
pub mod router;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testutil;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::types::Address;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chain_adapters::{ChainFeed, TxBroadcaster, TxSigner};
use crate::config::{ChainConfig, EngineConfig};
use crate::errors::SnipeError;
use crate::events::{EventBus, SniperEvent};
use crate::types::{
    parse_address, EngineStatus, ExecuteResponse, PreSignedTransaction, SnipeConfig,
};

use decoder::FactoryRegistry;
use dispatch::Dispatcher;
use monitor::BlockMonitor;
use presign::PresignStore;
use registry::ConfigRegistry;
use submitter::Executor;

/// Parsed chain parameters shared by the store, executor and dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    /// Chain ID payloads are bound to.
    pub chain_id: u64,
    /// Wrapped native token, the base asset of every snipe.
    pub base_token: Address,
    /// Router the swap calldata targets.
    pub router: Address,
}

impl ChainParams {
    /// Parse the address fields of a chain configuration.
    pub fn from_config(config: &ChainConfig) -> Result<Self, SnipeError> {
        Ok(Self {
            chain_id: config.chain_id,
            base_token: parse_address(&config.wrapped_native)?,
            router: parse_address(&config.router)?,
        })
    }
}

/// The liquidity-event sniping engine.
///
/// One instance per chain. All state is in memory and scoped to the
/// running process.
pub struct SnipeEngine {
    config: EngineConfig,
    store: Arc<PresignStore>,
    registry: Arc<ConfigRegistry>,
    executor: Arc<Executor>,
    monitor: Arc<BlockMonitor>,
    events: Arc<EventBus>,
    is_monitoring: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // Serializes pending-nonce reads per wallet; the store itself does not.
    wallet_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl SnipeEngine {
    /// Build an engine from its chain collaborators and configuration.
    pub fn new(
        feed: Arc<dyn ChainFeed>,
        broadcaster: Arc<dyn TxBroadcaster>,
        config: EngineConfig,
    ) -> Result<Self> {
        let params = ChainParams::from_config(&config.chain)
            .context("invalid chain addresses in configuration")?;
        let factories = Arc::new(
            FactoryRegistry::from_config(&config.chain.factories)
                .context("invalid factory addresses in configuration")?,
        );

        let events = Arc::new(EventBus::new(config.event_channel_capacity));
        let store = Arc::new(PresignStore::new(
            feed.clone(),
            params,
            config.gas.clone(),
            config.presign_ttl_secs,
            config.swap_deadline_secs,
            events.clone(),
        ));
        let registry = Arc::new(ConfigRegistry::new());
        let executor = Arc::new(Executor::new(
            store.clone(),
            broadcaster,
            events.clone(),
            params,
            config.swap_deadline_secs,
            config.confirmations,
            Duration::from_secs(config.confirmation_timeout_secs),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            store.clone(),
            executor.clone(),
            events.clone(),
            params,
        ));
        let monitor = Arc::new(BlockMonitor::new(
            feed,
            factories,
            dispatcher,
            store.clone(),
            events.clone(),
            params,
        ));

        Ok(Self {
            config,
            store,
            registry,
            executor,
            monitor,
            events,
            is_monitoring: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            wallet_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Start the block monitor and the periodic TTL sweep.
    pub async fn start(&self) -> Result<()> {
        if self.is_monitoring.swap(true, Ordering::SeqCst) {
            warn!("engine already running");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(shutdown_tx);

        let monitor_task = {
            let monitor = self.monitor.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                monitor.run(shutdown).await;
            })
        };

        let sweep_task = {
            let store = self.store.clone();
            let mut shutdown = shutdown_rx;
            let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            store.sweep().await;
                        }
                    }
                }
            })
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(monitor_task);
        tasks.push(sweep_task);

        info!("sniping engine started");
        Ok(())
    }

    /// Signal the background tasks to stop.
    pub async fn stop(&self) {
        if !self.is_monitoring.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(true);
        }
        self.tasks.lock().await.clear();
        info!("sniping engine stopped");
    }

    /// Prepare and sign a swap payload for the given rule.
    ///
    /// Creates for the same wallet are serialized here so concurrent calls
    /// cannot read the same pending nonce.
    pub async fn create_presigned(
        &self,
        config: &SnipeConfig,
        signer: Arc<dyn TxSigner>,
    ) -> Result<PreSignedTransaction, SnipeError> {
        let lock = {
            let mut locks = self.wallet_locks.lock().await;
            locks
                .entry(signer.address())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;
        self.store.create(config, signer).await
    }

    /// Execute a pre-signed entry by id.
    pub async fn execute_presigned(
        &self,
        id: &str,
        retarget: Option<Address>,
    ) -> ExecuteResponse {
        self.executor.execute(id, retarget).await
    }

    /// Register a snipe rule.
    pub async fn add_config(&self, config: SnipeConfig) {
        self.registry.add(config).await;
    }

    /// Remove a snipe rule by id.
    pub async fn remove_config(&self, id: &str) -> bool {
        self.registry.remove(id).await
    }

    /// Add a deployer address to the watch list.
    pub async fn add_watched_deployer(&self, address: &str) -> Result<(), SnipeError> {
        let parsed = parse_address(address)?;
        self.registry.add_watched(parsed).await;
        Ok(())
    }

    /// Remove a deployer address from the watch list.
    pub async fn remove_watched_deployer(&self, address: &str) -> Result<bool, SnipeError> {
        let parsed = parse_address(address)?;
        Ok(self.registry.remove_watched(parsed).await)
    }

    /// Case-insensitive watch-list membership test.
    pub async fn is_watched(&self, address: &str) -> bool {
        self.registry.is_watched(address).await
    }

    /// Watched deployers as lowercase hex strings.
    pub async fn list_watched(&self) -> Vec<String> {
        self.registry.list_watched().await
    }

    /// Introspection snapshot.
    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            is_monitoring: self.is_monitoring.load(Ordering::SeqCst),
            ready_count: self.store.ready_count().await,
            watched_deployer_count: self.registry.watched_count().await,
            pending_config_count: self.registry.enabled_count().await,
        }
    }

    /// Snapshot of every pre-signed entry, oldest first.
    pub async fn list_presigned(&self) -> Vec<PreSignedTransaction> {
        self.store.list().await
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SniperEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{
        any_snipe_config, fake_signer, pair_created_log, BroadcastMode, FakeBroadcaster,
        FakeFeed, BASE_TOKEN,
    };
    use super::*;
    use crate::chain_adapters::{BlockView, ReceiptView};
    use crate::config::FactoryConfig;
    use crate::types::PresignStatus;
    use ethers::types::H256;

    fn test_engine_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.chain.wrapped_native = format!("{:?}", *BASE_TOKEN);
        config.chain.router = format!("{:?}", Address::from_low_u64_be(0x0707));
        config.chain.factories = vec![FactoryConfig {
            address: format!("{:?}", Address::from_low_u64_be(0xFAC)),
            dex: "pancake_v2".to_string(),
        }];
        config.confirmation_timeout_secs = 1;
        config.sweep_interval_secs = 1;
        config
    }

    fn test_engine(mode: BroadcastMode) -> (SnipeEngine, Arc<FakeFeed>) {
        let feed = FakeFeed::new();
        let broadcaster = FakeBroadcaster::new(mode);
        let engine = SnipeEngine::new(feed.clone(), broadcaster, test_engine_config())
            .expect("engine construction");
        (engine, feed)
    }

    #[tokio::test]
    async fn rejects_bad_chain_addresses() {
        let mut config = test_engine_config();
        config.chain.router = "bogus".to_string();
        let result = SnipeEngine::new(
            FakeFeed::new(),
            FakeBroadcaster::new(BroadcastMode::Success),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_of_unknown_id_mutates_nothing() {
        let (engine, _feed) = test_engine(BroadcastMode::Success);
        engine
            .create_presigned(&any_snipe_config(), fake_signer())
            .await
            .unwrap();
        let before = engine.status().await;

        let response = engine.execute_presigned("nonexistent", None).await;
        assert!(!response.success);
        assert_eq!(
            response.error.unwrap(),
            "Pre-signed transaction not found"
        );

        let after = engine.status().await;
        assert_eq!(before.ready_count, after.ready_count);
        assert_eq!(before.pending_config_count, after.pending_config_count);
    }

    #[tokio::test]
    async fn list_presigned_tracks_the_full_lifecycle() {
        let (engine, _feed) = test_engine(BroadcastMode::Success);
        let signer = fake_signer();
        for _ in 0..3 {
            engine
                .create_presigned(&any_snipe_config(), signer.clone())
                .await
                .unwrap();
        }

        let listed = engine.list_presigned().await;
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|p| p.status == PresignStatus::Ready));

        let response = engine.execute_presigned(&listed[0].id, None).await;
        assert!(response.success);

        let listed = engine.list_presigned().await;
        let confirmed: Vec<_> = listed
            .iter()
            .filter(|p| p.status == PresignStatus::Confirmed)
            .collect();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(engine.status().await.ready_count, 2);
    }

    #[tokio::test]
    async fn watch_list_round_trip() {
        let (engine, _feed) = test_engine(BroadcastMode::Success);
        engine
            .add_watched_deployer("0xABCDEF0000000000000000000000000000000001")
            .await
            .unwrap();

        assert!(
            engine
                .is_watched("0xabcdef0000000000000000000000000000000001")
                .await
        );
        assert_eq!(engine.list_watched().await.len(), 1);
        assert_eq!(engine.status().await.watched_deployer_count, 1);

        assert!(
            engine
                .remove_watched_deployer("0xABCDEF0000000000000000000000000000000001")
                .await
                .unwrap()
        );
        assert!(
            !engine
                .is_watched("0xabcdef0000000000000000000000000000000001")
                .await
        );
        assert!(engine.add_watched_deployer("junk").await.is_err());
    }

    #[tokio::test]
    async fn config_management_updates_status() {
        let (engine, _feed) = test_engine(BroadcastMode::Success);
        let config = any_snipe_config();
        let id = config.id.clone();
        engine.add_config(config).await;
        assert_eq!(engine.status().await.pending_config_count, 1);

        assert!(engine.remove_config(&id).await);
        assert_eq!(engine.status().await.pending_config_count, 0);
        assert!(!engine.remove_config(&id).await);
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_wallet_get_distinct_nonces() {
        let (engine, _feed) = test_engine(BroadcastMode::Success);
        let engine = Arc::new(engine);
        let signer = fake_signer();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let signer = signer.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .create_presigned(&any_snipe_config(), signer)
                    .await
                    .unwrap()
            }));
        }
        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap().raw_fields.nonce);
        }
        nonces.sort();
        nonces.dedup();
        assert_eq!(nonces.len(), 4);
    }

    #[tokio::test]
    async fn started_engine_detects_and_snipes_a_launch() {
        let (engine, feed) = test_engine(BroadcastMode::Success);
        let mut rx = engine.subscribe();

        engine.add_config(any_snipe_config()).await;
        let presign = engine
            .create_presigned(&any_snipe_config(), fake_signer())
            .await
            .unwrap();

        let tx_hash = H256::repeat_byte(0x55);
        let token = Address::from_low_u64_be(0x7001);
        let log = pair_created_log(
            feed.known_factory(),
            *BASE_TOKEN,
            token,
            Address::from_low_u64_be(0x9001),
            tx_hash,
        );
        feed.insert_block(BlockView {
            number: 7,
            timestamp: 1_700_000_000,
            tx_hashes: vec![tx_hash],
        })
        .await;
        feed.insert_receipt(ReceiptView {
            tx_hash,
            block_number: Some(7),
            succeeded: true,
            logs: vec![log],
        })
        .await;
        feed.insert_sender(tx_hash, Address::from_low_u64_be(0xA))
            .await;

        engine.start().await.unwrap();
        assert!(engine.status().await.is_monitoring);
        feed.block_sender().send(7).await.unwrap();

        let mut detected = false;
        let mut sniped = false;
        for _ in 0..4 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Ok(SniperEvent::LiquidityDetected(event))) => {
                    assert_eq!(event.block_number, 7);
                    detected = true;
                }
                Ok(Ok(SniperEvent::LiquiditySniped(outcome))) => {
                    assert_eq!(outcome.presign_id, presign.id);
                    sniped = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(_)) | Err(_) => break,
            }
        }
        assert!(detected);
        assert!(sniped);

        engine.stop().await;
        assert!(!engine.status().await.is_monitoring);
    }
}
