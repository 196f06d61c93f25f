//! Centralized error types for the sniping engine
//!
//! Every module in the crate reports failures through `SnipeError` instead of
//! defining its own error enum. Scan-level errors (`Decode`, `Rpc`) are caught
//! and logged at the point of occurrence and never cross a block-scan
//! boundary; execution errors are recorded on the pre-signed entry itself and
//! surfaced through the returned response and the failure event.

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PresignStatus;

/// Common result alias for engine operations.
pub type SnipeResult<T> = std::result::Result<T, SnipeError>;

/// Error taxonomy for the sniping engine.
///
/// There is no fatal variant on purpose. The worst case anywhere in the
/// engine is a missed opportunity, never an outage.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SnipeError {
    /// Unknown pre-signed transaction id.
    #[error("Pre-signed transaction not found")]
    NotFound,

    /// Action attempted outside the required lifecycle state. Also the
    /// outcome handed to the loser of a double-claim race.
    #[error("invalid state: pre-signed transaction is {found}, expected Ready")]
    InvalidState {
        /// State the entry was actually in.
        found: PresignStatus,
    },

    /// The entry's TTL has passed.
    #[error("pre-signed transaction expired")]
    Expired,

    /// Broadcast or network failure while submitting.
    #[error("broadcast failed: {0}")]
    Submission(String),

    /// On-chain execution reverted.
    #[error("transaction reverted: {0}")]
    Revert(String),

    /// The confirmation wait hit the engine-level bound. The entry stays
    /// Submitted and must be reconciled out of band.
    #[error("confirmation not observed within {secs}s for tx {tx_hash:?}")]
    ConfirmationTimeout {
        /// Configured wait bound in seconds.
        secs: u64,
        /// Hash of the broadcast transaction.
        tx_hash: H256,
    },

    /// Unrecognized or malformed log. Non-fatal, the scan continues.
    #[error("failed to decode log: {0}")]
    Decode(String),

    /// Signing failure while preparing or retargeting a payload.
    #[error("signing failed: {0}")]
    Signing(String),

    /// RPC failure while talking to the chain feed.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl SnipeError {
    /// Wrap a chain-feed failure.
    pub fn rpc<E: std::fmt::Display>(err: E) -> Self {
        SnipeError::Rpc(err.to_string())
    }

    /// Wrap a broadcast failure.
    pub fn submission<E: std::fmt::Display>(err: E) -> Self {
        SnipeError::Submission(err.to_string())
    }

    /// Wrap a signer failure.
    pub fn signing<E: std::fmt::Display>(err: E) -> Self {
        SnipeError::Signing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_is_stable() {
        // Callers match on this exact text in their responses.
        assert_eq!(
            SnipeError::NotFound.to_string(),
            "Pre-signed transaction not found"
        );
    }

    #[test]
    fn invalid_state_names_the_observed_state() {
        let err = SnipeError::InvalidState {
            found: PresignStatus::Submitted,
        };
        assert!(err.to_string().contains("Submitted"));
    }

    #[test]
    fn expired_message_mentions_expiry() {
        assert!(SnipeError::Expired.to_string().contains("expired"));
    }
}
