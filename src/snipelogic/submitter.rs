//! Execution path for claimed payloads
//!
//! Drives a pre-signed entry from claim to its terminal state: an optional
//! re-sign when the dispatch token differs from what the payload was bound
//! to, the raw broadcast, and a bounded confirmation wait. Every outcome is
//! a typed response; nothing on this path panics or leaks an error into the
//! monitoring loop.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tracing::{error, info, warn};

use crate::chain_adapters::TxBroadcaster;
use crate::errors::SnipeError;
use crate::events::{EventBus, SniperEvent};
use crate::types::ExecuteResponse;

use super::presign::{resign_for_token, PresignStore};
use super::ChainParams;

/// Broadcasts claimed entries and resolves their terminal state.
pub struct Executor {
    store: Arc<PresignStore>,
    broadcaster: Arc<dyn TxBroadcaster>,
    events: Arc<EventBus>,
    params: ChainParams,
    swap_deadline_secs: u64,
    confirmations: usize,
    confirmation_timeout: Duration,
}

impl Executor {
    /// Create an executor over the given store and broadcast path.
    pub fn new(
        store: Arc<PresignStore>,
        broadcaster: Arc<dyn TxBroadcaster>,
        events: Arc<EventBus>,
        params: ChainParams,
        swap_deadline_secs: u64,
        confirmations: usize,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            events,
            params,
            swap_deadline_secs,
            confirmations,
            confirmation_timeout,
        }
    }

    /// Execute a pre-signed entry, optionally retargeted to another token.
    ///
    /// The claim happens before any suspension point, so a concurrent call
    /// for the same id loses with `InvalidState` before any payload leaves
    /// the process.
    pub async fn execute(&self, id: &str, retarget: Option<Address>) -> ExecuteResponse {
        let ticket = match self.store.claim(id, retarget).await {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!(id, %err, "execute rejected at claim");
                return ExecuteResponse::failure(&err);
            }
        };

        // A payload bound to a different token (or to a placeholder) is
        // rebuilt and re-signed with the same nonce and fees, so the bytes
        // on the wire always match the recorded fields.
        let payload = match ticket.resign_to {
            None => ticket.signed_payload.clone(),
            Some(token) => {
                match resign_for_token(&ticket, &self.params, self.swap_deadline_secs, token).await
                {
                    Ok((call_data, payload)) => {
                        self.store
                            .record_retarget(id, token, call_data, payload.clone())
                            .await;
                        payload
                    }
                    Err(err) => {
                        error!(id, %err, "retarget re-sign failed");
                        return self.fail(id, err).await;
                    }
                }
            }
        };

        let tx_hash = match self.broadcaster.broadcast(payload).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                let err = SnipeError::submission(err);
                return self.fail(id, err).await;
            }
        };
        self.store.record_submission(id, tx_hash).await;
        info!(id, ?tx_hash, "payload broadcast, awaiting confirmation");

        let confirmation = tokio::time::timeout(
            self.confirmation_timeout,
            self.broadcaster.await_confirmation(tx_hash, self.confirmations),
        )
        .await;

        match confirmation {
            Err(_elapsed) => {
                // The transaction may still land; the entry stays Submitted
                // and is reconciled out of band rather than declared dead.
                let err = SnipeError::ConfirmationTimeout {
                    secs: self.confirmation_timeout.as_secs(),
                    tx_hash,
                };
                warn!(id, %err, "confirmation wait bounded out");
                ExecuteResponse::failure_with_hash(&err, tx_hash)
            }
            Ok(Err(err)) => {
                let err = SnipeError::submission(err);
                self.store.mark_failed(id, &err.to_string()).await;
                self.events.publish(SniperEvent::PresignedFailed {
                    id: id.to_string(),
                    error: err.to_string(),
                });
                ExecuteResponse::failure_with_hash(&err, tx_hash)
            }
            Ok(Ok(view)) if view.succeeded => {
                self.store.mark_confirmed(id, tx_hash).await;
                info!(id, ?tx_hash, block = ?view.block_number, "execution confirmed");
                self.events.publish(SniperEvent::PresignedExecuted {
                    id: id.to_string(),
                    tx_hash,
                });
                ExecuteResponse::confirmed(tx_hash)
            }
            Ok(Ok(_view)) => {
                let err = SnipeError::Revert("swap reverted on chain".to_string());
                self.store.mark_failed(id, &err.to_string()).await;
                warn!(id, ?tx_hash, "execution reverted");
                self.events.publish(SniperEvent::PresignedFailed {
                    id: id.to_string(),
                    error: err.to_string(),
                });
                ExecuteResponse::failure_with_hash(&err, tx_hash)
            }
        }
    }

    async fn fail(&self, id: &str, err: SnipeError) -> ExecuteResponse {
        self.store.mark_failed(id, &err.to_string()).await;
        self.events.publish(SniperEvent::PresignedFailed {
            id: id.to_string(),
            error: err.to_string(),
        });
        ExecuteResponse::failure(&err)
    }
}
