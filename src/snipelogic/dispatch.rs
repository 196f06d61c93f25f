//! Match and dispatch engine
//!
//! The decision core. Given a decoded pair-creation event it selects the
//! matching rules, picks an eligible pre-signed entry per rule and drives
//! execution. Rules are fire-once: a rule is consumed by its first matching
//! attempt whether or not that attempt succeeds, and never retries on a
//! later event. Retrying means adding a fresh rule.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::{EventBus, SniperEvent};
use crate::types::{now_ms, now_ts, PairCreatedEvent, SnipeOutcome, TargetFilter};

use super::presign::PresignStore;
use super::registry::ConfigRegistry;
use super::submitter::Executor;
use super::ChainParams;

/// Matches forwarded pair-creation events against the rule registry.
pub struct Dispatcher {
    registry: Arc<ConfigRegistry>,
    store: Arc<PresignStore>,
    executor: Arc<Executor>,
    events: Arc<EventBus>,
    params: ChainParams,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry, store and executor.
    pub fn new(
        registry: Arc<ConfigRegistry>,
        store: Arc<PresignStore>,
        executor: Arc<Executor>,
        events: Arc<EventBus>,
        params: ChainParams,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            events,
            params,
        }
    }

    /// Run the matching algorithm for one forwarded event.
    ///
    /// The rule scan is linear; at tens to low hundreds of live rules an
    /// index would not pay for itself.
    pub async fn on_pair_created(&self, event: &PairCreatedEvent) {
        let target_token = event.counter_token(self.params.base_token);

        for config in self.registry.list().await {
            if !config.enabled {
                continue;
            }
            if let TargetFilter::Specific(deployer) = config.target_deployer {
                if deployer != event.deployer {
                    debug!(
                        config = %config.id,
                        want = ?deployer,
                        got = ?event.deployer,
                        "deployer filter rejected event"
                    );
                    continue;
                }
            }
            if let TargetFilter::Specific(token) = config.target_token {
                if token != event.token0 && token != event.token1 {
                    debug!(config = %config.id, "token filter rejected event");
                    continue;
                }
            }

            let Some(presign_id) = self.store.find_ready(target_token).await else {
                debug!(
                    config = %config.id,
                    token = ?target_token,
                    "no eligible pre-signed entry for matched config"
                );
                continue;
            };

            info!(
                config = %config.id,
                presign = %presign_id,
                pair = ?event.pair,
                "dispatching pre-signed transaction"
            );
            let response = self.executor.execute(&presign_id, Some(target_token)).await;

            // Fire-once: the rule is consumed even when the attempt failed.
            self.registry.disable(&config.id).await;

            if response.success {
                let tx_hash = response.tx_hash.unwrap_or_default();
                let latency_ms =
                    (now_ms() - (event.timestamp as i64) * 1000).max(0) as u64;
                let outcome = SnipeOutcome {
                    config_id: config.id.clone(),
                    presign_id,
                    pair: event.pair,
                    token: target_token,
                    tx_hash,
                    block_number: event.block_number,
                    latency_ms,
                    timestamp: now_ts(),
                };
                info!(
                    config = %config.id,
                    ?tx_hash,
                    latency_ms,
                    "liquidity sniped"
                );
                self.events.publish(SniperEvent::LiquiditySniped(outcome));
            } else {
                warn!(
                    config = %config.id,
                    error = response.error.as_deref().unwrap_or("unknown"),
                    "dispatch attempt failed, config consumed"
                );
            }
        }
    }
}
