//! Chain event monitor
//!
//! Consumes block notifications and scans each block's receipts for
//! pair-creation logs on known factories. Every block is processed on its
//! own task, so a slow scan or an in-flight execution never delays later
//! notifications or the TTL sweep. One malformed block, receipt or log is
//! skipped and never stops the rest of the scan.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::chain_adapters::ChainFeed;
use crate::events::{EventBus, SniperEvent};
use crate::types::PairCreatedEvent;

use super::decoder::{decode_pair_created, FactoryRegistry};
use super::dispatch::Dispatcher;
use super::presign::PresignStore;
use super::ChainParams;

/// Watches the chain head for new liquidity pairs.
pub struct BlockMonitor {
    feed: Arc<dyn ChainFeed>,
    factories: Arc<FactoryRegistry>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<PresignStore>,
    events: Arc<EventBus>,
    params: ChainParams,
}

impl BlockMonitor {
    /// Create a monitor over the given feed and dispatch pipeline.
    pub fn new(
        feed: Arc<dyn ChainFeed>,
        factories: Arc<FactoryRegistry>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<PresignStore>,
        events: Arc<EventBus>,
        params: ChainParams,
    ) -> Self {
        Self {
            feed,
            factories,
            dispatcher,
            store,
            events,
            params,
        }
    }

    /// Consume block notifications until shutdown is signalled.
    ///
    /// Blocks arrive in provider order; skipped blocks are not backfilled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut blocks = match self.feed.subscribe_blocks().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("failed to subscribe to blocks: {}", e);
                return;
            }
        };
        info!(
            factories = self.factories.len(),
            "block monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("block monitor stopping");
                    break;
                }
                notification = blocks.recv() => {
                    match notification {
                        Some(number) => {
                            let monitor = self.clone();
                            tokio::spawn(async move {
                                monitor.process_block(number).await;
                            });
                        }
                        None => {
                            warn!("block feed closed, monitor stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Scan one block for pair creations.
    pub async fn process_block(&self, number: u64) {
        trace!(number, "processing block");
        // One sweep per block arrival, independent of the interval sweep.
        self.store.sweep().await;

        let block = match self.feed.get_block(number).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(number, "block not available, skipping");
                return;
            }
            Err(e) => {
                warn!(number, "failed to fetch block: {}", e);
                return;
            }
        };

        for tx_hash in &block.tx_hashes {
            let receipt = match self.feed.get_transaction_receipt(*tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(e) => {
                    debug!(?tx_hash, "failed to fetch receipt: {}", e);
                    continue;
                }
            };

            for log in &receipt.logs {
                let Some(dex) = self.factories.dex_for(log.address) else {
                    continue;
                };
                let dex = dex.to_string();

                let decoded = match decode_pair_created(log) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        debug!(factory = ?log.address, "undecodable factory log: {}", e);
                        continue;
                    }
                };

                // Only pairs against the configured base asset are actionable.
                if decoded.token0 != self.params.base_token
                    && decoded.token1 != self.params.base_token
                {
                    trace!(pair = ?decoded.pair, "pair without base asset, dropped");
                    continue;
                }

                let deployer = match self.feed.get_transaction_sender(*tx_hash).await {
                    Ok(Some(sender)) => sender,
                    Ok(None) => {
                        debug!(?tx_hash, "creating transaction unknown, event skipped");
                        continue;
                    }
                    Err(e) => {
                        debug!(?tx_hash, "failed to fetch sender: {}", e);
                        continue;
                    }
                };

                let event = PairCreatedEvent {
                    pair: decoded.pair,
                    token0: decoded.token0,
                    token1: decoded.token1,
                    factory: log.address,
                    dex,
                    tx_hash: *tx_hash,
                    block_number: block.number,
                    timestamp: block.timestamp,
                    deployer,
                };
                info!(
                    pair = ?event.pair,
                    dex = %event.dex,
                    block = number,
                    deployer = ?event.deployer,
                    "liquidity pair detected"
                );
                self.events
                    .publish(SniperEvent::LiquidityDetected(event.clone()));
                self.dispatcher.on_pair_created(&event).await;
            }
        }
    }
}
