//! Chain collaborator contracts
//!
//! Narrow interfaces to everything the engine consumes from the outside:
//! the block/receipt feed, the broadcast path and the signer. The engine is
//! constructed from trait objects so tests run against in-process fakes and
//! production runs against [`evm_adapter::EvmAdapter`].
//!
//! Provider connectivity, failover and key custody live behind these traits
//! and are not this crate's concern.

pub mod evm_adapter;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use tokio::sync::mpsc;

/// A block header slice with its transaction identifiers.
#[derive(Debug, Clone)]
pub struct BlockView {
    /// Block number.
    pub number: u64,
    /// Block timestamp, UNIX seconds.
    pub timestamp: u64,
    /// Transaction hashes in block order.
    pub tx_hashes: Vec<H256>,
}

/// A log entry as seen in a transaction receipt.
#[derive(Debug, Clone)]
pub struct LogView {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, topic0 first.
    pub topics: Vec<H256>,
    /// Unindexed data.
    pub data: Bytes,
    /// Transaction the log belongs to.
    pub tx_hash: H256,
}

/// A transaction receipt slice.
#[derive(Debug, Clone)]
pub struct ReceiptView {
    /// Transaction hash.
    pub tx_hash: H256,
    /// Block the transaction landed in.
    pub block_number: Option<u64>,
    /// Whether on-chain execution succeeded.
    pub succeeded: bool,
    /// Logs emitted by the transaction.
    pub logs: Vec<LogView>,
}

/// EIP-1559 fee estimate, already scaled by the caller's policy.
#[derive(Debug, Clone, Copy)]
pub struct FeeEstimate {
    /// Max fee per gas, wei.
    pub max_fee_per_gas: U256,
    /// Max priority fee per gas, wei.
    pub max_priority_fee_per_gas: U256,
}

/// Confirmation outcome for a broadcast transaction.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationView {
    /// Transaction hash.
    pub tx_hash: H256,
    /// Block the transaction confirmed in.
    pub block_number: Option<u64>,
    /// Whether on-chain execution succeeded.
    pub succeeded: bool,
}

/// Read path to the chain: block notifications, receipts, nonces and fees.
#[async_trait]
pub trait ChainFeed: Send + Sync + 'static {
    /// Subscribe to new block numbers in arrival order.
    ///
    /// Blocks the provider skipped notifying about are not replayed.
    async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<u64>>;

    /// Fetch a block with its transaction hashes. `None` when the provider
    /// does not have it.
    async fn get_block(&self, number: u64) -> Result<Option<BlockView>>;

    /// Fetch a transaction receipt. `None` when unavailable.
    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptView>>;

    /// Fetch the sender of a transaction. `None` when the transaction is
    /// unknown to the provider.
    async fn get_transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>>;

    /// The account's current pending nonce.
    ///
    /// Concurrent callers for the same wallet race on allocation; callers
    /// serialize per wallet.
    async fn pending_nonce(&self, address: Address) -> Result<U256>;

    /// Estimate EIP-1559 fees, scaled by `multiplier`.
    async fn estimate_fees(&self, multiplier: f64) -> Result<FeeEstimate>;
}

/// Write path to the chain: raw broadcast plus confirmation wait.
#[async_trait]
pub trait TxBroadcaster: Send + Sync + 'static {
    /// Broadcast a signed payload, returning its transaction hash.
    async fn broadcast(&self, payload: Bytes) -> Result<H256>;

    /// Wait until the transaction has the requested confirmations.
    ///
    /// This wait is unbounded; the engine applies its own timeout around it.
    async fn await_confirmation(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<ConfirmationView>;
}

/// Transaction signer contract.
#[async_trait]
pub trait TxSigner: Send + Sync + 'static {
    /// Address of the signing account.
    fn address(&self) -> Address;

    /// Sign a transaction, returning the RLP-encoded signed payload.
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes>;
}
