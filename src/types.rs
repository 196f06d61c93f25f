//! Shared data model for the sniping engine
//!
//! Core types used across the codebase. The filter fields use an explicit
//! `Any | Specific` variant instead of optionals so the matching logic in the
//! dispatch engine stays exhaustive and independently testable.

use chrono::Utc;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::errors::SnipeError;

/// Filter on a token or deployer address.
///
/// Address comparison is byte-wise, so case-insensitivity of hex inputs is
/// handled once at the parsing boundary rather than at every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFilter {
    /// Matches every address.
    Any,
    /// Matches exactly one address.
    Specific(Address),
}

impl TargetFilter {
    /// Whether the filter accepts the given address.
    pub fn matches(&self, address: Address) -> bool {
        match self {
            TargetFilter::Any => true,
            TargetFilter::Specific(expected) => *expected == address,
        }
    }

    /// The concrete address, if the filter names one.
    pub fn specific(&self) -> Option<Address> {
        match self {
            TargetFilter::Any => None,
            TargetFilter::Specific(addr) => Some(*addr),
        }
    }
}

impl Default for TargetFilter {
    fn default() -> Self {
        TargetFilter::Any
    }
}

/// Lifecycle state of a pre-signed transaction.
///
/// Transitions are strictly forward: `Ready -> {Submitted, Expired}` and
/// `Submitted -> {Confirmed, Failed}`. Nothing ever returns to `Ready`;
/// retrying after a terminal state means creating a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresignStatus {
    /// Signed and waiting for a trigger.
    Ready,
    /// Claimed for broadcast. In-flight.
    Submitted,
    /// Included on chain with a success status.
    Confirmed,
    /// Broadcast failed or the transaction reverted.
    Failed,
    /// TTL passed before the entry was claimed.
    Expired,
}

impl std::fmt::Display for PresignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PresignStatus::Ready => "Ready",
            PresignStatus::Submitted => "Submitted",
            PresignStatus::Confirmed => "Confirmed",
            PresignStatus::Failed => "Failed",
            PresignStatus::Expired => "Expired",
        };
        f.write_str(name)
    }
}

/// Logical fields of a prepared transaction, kept for inspection.
///
/// These mirror what was signed but are not authoritative for what gets
/// broadcast. Only the signed payload is ever sent to the network, and any
/// retargeting re-signs so the two never diverge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTxFields {
    /// Router contract the swap is sent to.
    pub to: Address,
    /// ABI-encoded swap call.
    pub call_data: Bytes,
    /// Native value attached (the amount swapped in).
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// EIP-1559 max fee per gas, in wei.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee per gas, in wei.
    pub max_priority_fee_per_gas: U256,
    /// Account nonce the payload was signed with.
    pub nonce: U256,
    /// Chain the payload is bound to.
    pub chain_id: u64,
}

/// A fully signed, broadcast-ready swap transaction prepared in advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreSignedTransaction {
    /// Unique identifier.
    pub id: String,
    /// Token the payload is bound to, if known at signing time.
    pub target_token: TargetFilter,
    /// Optional deployer constraint, informational only.
    pub target_deployer: TargetFilter,
    /// RLP-encoded signed transaction. This is what gets broadcast.
    pub signed_payload: Bytes,
    /// Echo of the signed transaction's logical fields.
    pub raw_fields: RawTxFields,
    /// Owning wallet identifier.
    pub wallet_id: String,
    /// Signing wallet address.
    pub wallet_address: Address,
    /// Amount of the base asset swapped in, in wei.
    pub amount_in: U256,
    /// UNIX seconds the entry was created.
    pub created_at: i64,
    /// UNIX seconds past which the entry can no longer be claimed.
    pub expires_at: i64,
    /// Lifecycle state.
    pub status: PresignStatus,
    /// Broadcast transaction hash, once submitted.
    pub tx_hash: Option<H256>,
    /// Failure description, once failed.
    pub error: Option<String>,
}

/// A rule describing which pair-creation events trigger dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipeConfig {
    /// Unique identifier.
    pub id: String,
    /// Whether the rule is live. Cleared after the first matching attempt.
    pub enabled: bool,
    /// Deployer filter.
    pub target_deployer: TargetFilter,
    /// Token filter.
    pub target_token: TargetFilter,
    /// DEX identity this rule applies to.
    pub dex: String,
    /// Base-asset amount to swap in, in wei.
    pub amount_in: U256,
    /// Owning wallet identifier.
    pub wallet_id: String,
    /// Gas limit override.
    pub gas_limit: Option<u64>,
    /// Multiplier applied on top of the estimated fees.
    pub gas_multiplier: f64,
    /// Explicit priority-fee override in gwei. Wins over the estimate.
    pub bribe_gwei: Option<f64>,
}

impl SnipeConfig {
    /// Create a rule with a fresh id and default gas policy.
    pub fn new(
        target_deployer: TargetFilter,
        target_token: TargetFilter,
        dex: impl Into<String>,
        amount_in: U256,
        wallet_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enabled: true,
            target_deployer,
            target_token,
            dex: dex.into(),
            amount_in,
            wallet_id: wallet_id.into(),
            gas_limit: None,
            gas_multiplier: 1.25,
            bribe_gwei: None,
        }
    }
}

/// A decoded pair-creation log. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCreatedEvent {
    /// Address of the new pair contract.
    pub pair: Address,
    /// First token of the pair.
    pub token0: Address,
    /// Second token of the pair.
    pub token1: Address,
    /// Factory that emitted the log.
    pub factory: Address,
    /// DEX identity of the factory.
    pub dex: String,
    /// Transaction that created the pair.
    pub tx_hash: H256,
    /// Block the creation landed in.
    pub block_number: u64,
    /// Block timestamp, UNIX seconds.
    pub timestamp: u64,
    /// Sender of the creating transaction.
    pub deployer: Address,
}

impl PairCreatedEvent {
    /// The side of the pair that is not the given base asset.
    ///
    /// Falls back to `token1` when neither side is the base asset; callers
    /// filter those pairs out before dispatch.
    pub fn counter_token(&self, base: Address) -> Address {
        if self.token0 == base {
            self.token1
        } else {
            self.token0
        }
    }
}

/// Result record synthesized after a successful snipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipeOutcome {
    /// Configuration that fired.
    pub config_id: String,
    /// Pre-signed entry that was consumed.
    pub presign_id: String,
    /// Pair that triggered the dispatch.
    pub pair: Address,
    /// Token that was bought.
    pub token: Address,
    /// Hash of the confirmed transaction.
    pub tx_hash: H256,
    /// Block the pair creation landed in.
    pub block_number: u64,
    /// Milliseconds between the pair-creation block timestamp and the
    /// confirmed execution.
    pub latency_ms: u64,
    /// UNIX seconds the snipe completed.
    pub timestamp: i64,
}

/// Typed outcome of an execute call. Failures are values, never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Whether the transaction confirmed successfully.
    pub success: bool,
    /// Broadcast transaction hash, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    /// Successful execution with its transaction hash.
    pub fn confirmed(tx_hash: H256) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            error: None,
        }
    }

    /// Failed execution without a broadcast hash.
    pub fn failure(error: &SnipeError) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error.to_string()),
        }
    }

    /// Failed execution for a payload that did reach the network.
    pub fn failure_with_hash(error: &SnipeError, tx_hash: H256) -> Self {
        Self {
            success: false,
            tx_hash: Some(tx_hash),
            error: Some(error.to_string()),
        }
    }
}

/// Introspection snapshot of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether the block monitor is running.
    pub is_monitoring: bool,
    /// Pre-signed entries currently in `Ready`.
    pub ready_count: usize,
    /// Distinct deployer addresses on the watch list.
    pub watched_deployer_count: usize,
    /// Enabled snipe configurations.
    pub pending_config_count: usize,
}

/// Parse a hex address, tolerating an optional `0x` prefix and any casing.
pub fn parse_address(input: &str) -> Result<Address, SnipeError> {
    input
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .parse::<Address>()
        .map_err(|e| SnipeError::Decode(format!("invalid address '{}': {}", input, e)))
}

/// Current UNIX time in seconds.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Current UNIX time in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_filter_matches() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        assert!(TargetFilter::Any.matches(a));
        assert!(TargetFilter::Specific(a).matches(a));
        assert!(!TargetFilter::Specific(a).matches(b));
    }

    #[test]
    fn parse_address_is_case_insensitive() {
        let upper = parse_address("0xC02AAA39B223FE8D0A0E5C4F27EAD9083C756CC2").unwrap();
        let lower = parse_address("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap();
        let bare = parse_address("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, bare);
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn counter_token_picks_the_non_base_side() {
        let base = Address::from_low_u64_be(10);
        let token = Address::from_low_u64_be(20);
        let event = PairCreatedEvent {
            pair: Address::from_low_u64_be(30),
            token0: base,
            token1: token,
            factory: Address::from_low_u64_be(40),
            dex: "uniswap_v2".to_string(),
            tx_hash: H256::zero(),
            block_number: 1,
            timestamp: 0,
            deployer: Address::from_low_u64_be(50),
        };
        assert_eq!(event.counter_token(base), token);

        let flipped = PairCreatedEvent {
            token0: token,
            token1: base,
            ..event
        };
        assert_eq!(flipped.counter_token(base), token);
    }

    #[test]
    fn execute_response_serializes_without_empty_fields() {
        let resp = ExecuteResponse::confirmed(H256::zero());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("error"));
    }
}
