//! EVM adapter
//!
//! Production implementation of the chain collaborator traits over an
//! ethers websocket provider. One adapter per engine instance, bound to a
//! single chain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::providers::{Middleware, Provider, Ws};
use futures::StreamExt;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, H256, U256, U64};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ChainConfig;

use super::{BlockView, ChainFeed, ConfirmationView, FeeEstimate, LogView, ReceiptView, TxBroadcaster, TxSigner};

/// Receipt polling cadence during confirmation waits.
const CONFIRMATION_POLL_MS: u64 = 1_000;

/// Buffered capacity of the block notification channel.
const BLOCK_CHANNEL_CAPACITY: usize = 256;

/// Adapter over a websocket JSON-RPC provider.
pub struct EvmAdapter {
    chain_id: u64,
    provider: Provider<Ws>,
}

impl EvmAdapter {
    /// Connect to the chain's websocket endpoint.
    pub async fn connect(config: &ChainConfig) -> Result<Arc<Self>> {
        info!(chain = %config.name, url = %config.ws_url, "connecting provider");
        let provider = Provider::<Ws>::connect(&config.ws_url)
            .await
            .with_context(|| format!("failed to connect to {}", config.ws_url))?;
        Ok(Arc::new(Self {
            chain_id: config.chain_id,
            provider,
        }))
    }

    /// Chain ID this adapter is bound to.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl ChainFeed for EvmAdapter {
    async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<u64>> {
        let (tx, rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        let provider = self.provider.clone();
        tokio::spawn(async move {
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("block subscription failed: {}", e);
                    return;
                }
            };
            while let Some(block) = stream.next().await {
                let Some(number) = block.number else {
                    continue;
                };
                if tx.send(number.as_u64()).await.is_err() {
                    // Receiver dropped, the monitor shut down.
                    break;
                }
            }
            warn!("block subscription stream ended");
        });
        Ok(rx)
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockView>> {
        let block = self
            .provider
            .get_block(number)
            .await
            .context("get_block failed")?;
        Ok(block.map(|b| BlockView {
            number: b.number.map(|n| n.as_u64()).unwrap_or(number),
            timestamp: b.timestamp.as_u64(),
            tx_hashes: b.transactions,
        }))
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptView>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .context("get_transaction_receipt failed")?;
        Ok(receipt.map(|r| ReceiptView {
            tx_hash,
            block_number: r.block_number.map(|n| n.as_u64()),
            succeeded: r.status == Some(U64::from(1)),
            logs: r
                .logs
                .into_iter()
                .map(|log| LogView {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    tx_hash: log.transaction_hash.unwrap_or(tx_hash),
                })
                .collect(),
        }))
    }

    async fn get_transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>> {
        let tx = self
            .provider
            .get_transaction(tx_hash)
            .await
            .context("get_transaction failed")?;
        Ok(tx.map(|t| t.from))
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256> {
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .context("get_transaction_count failed")?;
        Ok(nonce)
    }

    async fn estimate_fees(&self, multiplier: f64) -> Result<FeeEstimate> {
        let (max_fee, priority_fee) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .context("estimate_eip1559_fees failed")?;
        Ok(FeeEstimate {
            max_fee_per_gas: scale_fee(max_fee, multiplier),
            max_priority_fee_per_gas: scale_fee(priority_fee, multiplier),
        })
    }
}

/// Scale a wei amount by a float multiplier using basis points.
fn scale_fee(fee: U256, multiplier: f64) -> U256 {
    if multiplier <= 0.0 {
        return fee;
    }
    let bps = (multiplier * 10_000.0).round() as u64;
    fee * U256::from(bps) / U256::from(10_000u64)
}

#[async_trait]
impl TxBroadcaster for EvmAdapter {
    async fn broadcast(&self, payload: Bytes) -> Result<H256> {
        let pending = self
            .provider
            .send_raw_transaction(payload)
            .await
            .context("send_raw_transaction failed")?;
        let tx_hash = *pending;
        debug!(?tx_hash, "payload broadcast");
        Ok(tx_hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<ConfirmationView> {
        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .context("get_transaction_receipt failed")?
            {
                if let Some(block_number) = receipt.block_number {
                    let confirmed = if confirmations <= 1 {
                        true
                    } else {
                        let head = self
                            .provider
                            .get_block_number()
                            .await
                            .context("get_block_number failed")?;
                        head.as_u64() + 1 >= block_number.as_u64() + confirmations as u64
                    };
                    if confirmed {
                        return Ok(ConfirmationView {
                            tx_hash,
                            block_number: Some(block_number.as_u64()),
                            succeeded: receipt.status == Some(U64::from(1)),
                        });
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(CONFIRMATION_POLL_MS)).await;
        }
    }
}

/// Signer over an in-memory wallet key.
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Build a signer from a hex private key, bound to the given chain.
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("invalid private key")?;
        Ok(Self {
            wallet: wallet.with_chain_id(chain_id),
        })
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .context("wallet signing failed")?;
        Ok(tx.rlp_signed(&signature))
    }
}
