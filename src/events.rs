//! Lifecycle event channel
//!
//! Typed publish/subscribe channel for engine lifecycle notifications.
//! Delivery is at-least-once within the process with no persistence or
//! replay; a lagging subscriber loses the oldest events, which is the
//! documented behavior of the underlying broadcast channel.

use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{PairCreatedEvent, PreSignedTransaction, SnipeOutcome};

/// Engine lifecycle notification.
#[derive(Debug, Clone)]
pub enum SniperEvent {
    /// A pre-signed transaction was created and is ready to fire.
    PresignedCreated(PreSignedTransaction),
    /// A pre-signed transaction confirmed on chain.
    PresignedExecuted {
        /// Entry id.
        id: String,
        /// Confirmed transaction hash.
        tx_hash: ethers::types::H256,
    },
    /// A pre-signed transaction failed to broadcast or reverted.
    PresignedFailed {
        /// Entry id.
        id: String,
        /// Failure description.
        error: String,
    },
    /// A new liquidity pair involving the base asset was detected.
    LiquidityDetected(PairCreatedEvent),
    /// A detected pair was sniped successfully.
    LiquiditySniped(SnipeOutcome),
}

impl SniperEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SniperEvent::PresignedCreated(_) => "presigned:created",
            SniperEvent::PresignedExecuted { .. } => "presigned:executed",
            SniperEvent::PresignedFailed { .. } => "presigned:failed",
            SniperEvent::LiquidityDetected(_) => "liquidity:detected",
            SniperEvent::LiquiditySniped(_) => "liquidity:sniped",
        }
    }
}

/// In-process fan-out channel for [`SniperEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<SniperEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SniperEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing never fails: with no subscribers the event is dropped,
    /// which is fine for a fire-and-forget notification channel.
    pub fn publish(&self, event: SniperEvent) {
        trace!(kind = event.kind(), "publishing event");
        let _ = self.sender.send(event);
    }
}
