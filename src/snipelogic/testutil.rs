//! In-process fakes for the chain collaborators, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;
use tokio::sync::{mpsc, Mutex};

use crate::chain_adapters::{
    BlockView, ChainFeed, ConfirmationView, FeeEstimate, LogView, ReceiptView, TxBroadcaster,
    TxSigner,
};
use crate::config::GasStrategy;
use crate::events::EventBus;
use crate::types::{SnipeConfig, TargetFilter};

use super::decoder::FactoryRegistry;
use super::dispatch::Dispatcher;
use super::monitor::BlockMonitor;
use super::presign::PresignStore;
use super::registry::ConfigRegistry;
use super::router::PAIR_CREATED_TOPIC;
use super::submitter::Executor;
use super::ChainParams;

/// Base asset used by every fake chain.
pub static BASE_TOKEN: Lazy<Address> = Lazy::new(|| Address::from_low_u64_be(0xBA5E));

const FAKE_FACTORY: u64 = 0xFAC;
const FAKE_ROUTER: u64 = 0x0707;

pub fn test_params() -> ChainParams {
    ChainParams {
        chain_id: 31_337,
        base_token: *BASE_TOKEN,
        router: Address::from_low_u64_be(FAKE_ROUTER),
    }
}

pub fn any_snipe_config() -> SnipeConfig {
    SnipeConfig::new(
        TargetFilter::Any,
        TargetFilter::Any,
        "pancake_v2",
        U256::exp10(17),
        "w1",
    )
}

/// Build a well-formed `PairCreated` log for the fakes.
pub fn pair_created_log(
    factory: Address,
    token0: Address,
    token1: Address,
    pair: Address,
    tx_hash: H256,
) -> LogView {
    fn topic(address: Address) -> H256 {
        let mut raw = [0u8; 32];
        raw[12..].copy_from_slice(address.as_bytes());
        H256::from(raw)
    }
    let mut data = vec![0u8; 64];
    data[12..32].copy_from_slice(pair.as_bytes());
    data[63] = 1;
    LogView {
        address: factory,
        topics: vec![*PAIR_CREATED_TOPIC, topic(token0), topic(token1)],
        data: Bytes::from(data),
        tx_hash,
    }
}

/// Build a pair-creation event without going through a block scan.
pub fn pair_event(
    token0: Address,
    token1: Address,
    deployer: Address,
) -> crate::types::PairCreatedEvent {
    crate::types::PairCreatedEvent {
        pair: Address::from_low_u64_be(0x9999),
        token0,
        token1,
        factory: Address::from_low_u64_be(FAKE_FACTORY),
        dex: "pancake_v2".to_string(),
        tx_hash: H256::repeat_byte(0xEE),
        block_number: 1,
        timestamp: 1_700_000_000,
        deployer,
    }
}

/// Deterministic in-memory chain feed.
pub struct FakeFeed {
    block_tx: mpsc::Sender<u64>,
    block_rx: Mutex<Option<mpsc::Receiver<u64>>>,
    blocks: Mutex<HashMap<u64, BlockView>>,
    receipts: Mutex<HashMap<H256, ReceiptView>>,
    senders: Mutex<HashMap<H256, Address>>,
    nonces: Mutex<HashMap<Address, u64>>,
}

impl FakeFeed {
    pub fn new() -> Arc<Self> {
        let (block_tx, block_rx) = mpsc::channel(64);
        Arc::new(Self {
            block_tx,
            block_rx: Mutex::new(Some(block_rx)),
            blocks: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            senders: Mutex::new(HashMap::new()),
            nonces: Mutex::new(HashMap::new()),
        })
    }

    pub fn known_factory(&self) -> Address {
        Address::from_low_u64_be(FAKE_FACTORY)
    }

    pub fn block_sender(&self) -> mpsc::Sender<u64> {
        self.block_tx.clone()
    }

    pub async fn insert_block(&self, block: BlockView) {
        self.blocks.lock().await.insert(block.number, block);
    }

    pub async fn insert_receipt(&self, receipt: ReceiptView) {
        self.receipts.lock().await.insert(receipt.tx_hash, receipt);
    }

    pub async fn insert_sender(&self, tx_hash: H256, sender: Address) {
        self.senders.lock().await.insert(tx_hash, sender);
    }
}

#[async_trait]
impl ChainFeed for FakeFeed {
    async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<u64>> {
        self.block_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("already subscribed"))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockView>> {
        Ok(self.blocks.lock().await.get(&number).cloned())
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptView>> {
        Ok(self.receipts.lock().await.get(&tx_hash).cloned())
    }

    async fn get_transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>> {
        Ok(self.senders.lock().await.get(&tx_hash).copied())
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256> {
        let mut nonces = self.nonces.lock().await;
        let next = nonces.entry(address).or_insert(0);
        let current = *next;
        *next += 1;
        Ok(U256::from(current))
    }

    async fn estimate_fees(&self, _multiplier: f64) -> Result<FeeEstimate> {
        Ok(FeeEstimate {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
        })
    }
}

/// Outcome the fake broadcast path should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Broadcast and confirm successfully.
    Success,
    /// Sleep briefly inside broadcast, then confirm successfully.
    SlowSuccess,
    /// Broadcast, then report an on-chain revert.
    Revert,
    /// Fail the broadcast itself.
    RejectBroadcast,
    /// Broadcast, then never produce a confirmation.
    NeverConfirm,
}

pub struct FakeBroadcaster {
    mode: BroadcastMode,
    sent: Mutex<Vec<Bytes>>,
}

impl FakeBroadcaster {
    pub fn new(mode: BroadcastMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl TxBroadcaster for FakeBroadcaster {
    async fn broadcast(&self, payload: Bytes) -> Result<H256> {
        if self.mode == BroadcastMode::SlowSuccess {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.mode == BroadcastMode::RejectBroadcast {
            return Err(anyhow!("nonce too low"));
        }
        let tx_hash = H256::from(keccak256(&payload));
        self.sent.lock().await.push(payload);
        Ok(tx_hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: H256,
        _confirmations: usize,
    ) -> Result<ConfirmationView> {
        match self.mode {
            BroadcastMode::NeverConfirm => std::future::pending().await,
            BroadcastMode::Revert => Ok(ConfirmationView {
                tx_hash,
                block_number: Some(1),
                succeeded: false,
            }),
            _ => Ok(ConfirmationView {
                tx_hash,
                block_number: Some(1),
                succeeded: true,
            }),
        }
    }
}

/// Signer producing a deterministic pseudo-payload from the transaction RLP.
pub struct FakeSigner {
    address: Address,
}

#[async_trait]
impl TxSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes> {
        Ok(tx.rlp())
    }
}

pub fn fake_signer() -> Arc<dyn TxSigner> {
    Arc::new(FakeSigner {
        address: Address::from_low_u64_be(0x5151),
    })
}

pub fn test_store() -> (Arc<PresignStore>, Arc<EventBus>) {
    let events = Arc::new(EventBus::new(64));
    let store = Arc::new(PresignStore::new(
        FakeFeed::new(),
        test_params(),
        GasStrategy::default(),
        900,
        3600,
        events.clone(),
    ));
    (store, events)
}

pub fn test_executor(
    mode: BroadcastMode,
) -> (Executor, Arc<PresignStore>, Arc<FakeBroadcaster>, Arc<EventBus>) {
    let (store, events) = test_store();
    let broadcaster = FakeBroadcaster::new(mode);
    let executor = Executor::new(
        store.clone(),
        broadcaster.clone(),
        events.clone(),
        test_params(),
        3600,
        1,
        Duration::from_millis(200),
    );
    (executor, store, broadcaster, events)
}

pub fn test_dispatcher(
    mode: BroadcastMode,
) -> (Dispatcher, Arc<ConfigRegistry>, Arc<PresignStore>, Arc<EventBus>) {
    let (executor, store, _broadcaster, events) = test_executor(mode);
    let registry = Arc::new(ConfigRegistry::new());
    let dispatcher = Dispatcher::new(
        registry.clone(),
        store.clone(),
        Arc::new(executor),
        events.clone(),
        test_params(),
    );
    (dispatcher, registry, store, events)
}

pub fn test_monitor(
    mode: BroadcastMode,
) -> (
    BlockMonitor,
    Arc<FakeFeed>,
    Arc<ConfigRegistry>,
    Arc<PresignStore>,
    Arc<EventBus>,
) {
    let feed = FakeFeed::new();
    let events = Arc::new(EventBus::new(64));
    let store = Arc::new(PresignStore::new(
        feed.clone(),
        test_params(),
        GasStrategy::default(),
        900,
        3600,
        events.clone(),
    ));
    let broadcaster = FakeBroadcaster::new(mode);
    let executor = Arc::new(Executor::new(
        store.clone(),
        broadcaster,
        events.clone(),
        test_params(),
        3600,
        1,
        Duration::from_millis(200),
    ));
    let registry = Arc::new(ConfigRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        store.clone(),
        executor,
        events.clone(),
        test_params(),
    ));
    let factories = Arc::new(
        FactoryRegistry::from_config(&[crate::config::FactoryConfig {
            address: format!("{:?}", Address::from_low_u64_be(FAKE_FACTORY)),
            dex: "pancake_v2".to_string(),
        }])
        .expect("static factory config"),
    );
    let monitor = BlockMonitor::new(
        feed.clone(),
        factories,
        dispatcher,
        store.clone(),
        events.clone(),
        test_params(),
    );
    (monitor, feed, registry, store, events)
}
