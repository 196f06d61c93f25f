//! Pre-signed transaction store
//!
//! Owns every prepared swap payload and its lifecycle state. Entries are
//! never physically deleted; only their status advances, and every
//! transition happens under the store's write lock. `claim` is the single
//! gate from `Ready` to `Submitted`, which is also where the double-claim
//! and sweep-vs-execute races are decided: whichever caller takes the lock
//! first wins, the other sees the already-advanced state.
//!
//! Nonce allocation is read from the feed's pending count at create time and
//! is NOT serialized here. Callers creating payloads concurrently for the
//! same wallet must hold a per-wallet allocation lock, as the engine does.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain_adapters::{ChainFeed, TxSigner};
use crate::config::GasStrategy;
use crate::errors::SnipeError;
use crate::events::{EventBus, SniperEvent};
use crate::types::{now_ts, PreSignedTransaction, PresignStatus, RawTxFields, SnipeConfig, TargetFilter};

use super::router::encode_snipe_swap;
use super::ChainParams;

/// A claimed entry, handed to the executor after `Ready -> Submitted`.
pub struct ClaimTicket {
    /// Entry id.
    pub id: String,
    /// Payload as signed at creation time.
    pub signed_payload: Bytes,
    /// Token to rebuild the calldata for before broadcasting. `None` means
    /// the original payload is broadcast untouched.
    pub resign_to: Option<Address>,
    /// Signer that produced the original payload.
    pub signer: Arc<dyn TxSigner>,
    /// Logical fields of the signed transaction.
    pub raw: RawTxFields,
    /// Recipient of the swap output.
    pub wallet_address: Address,
}

impl std::fmt::Debug for ClaimTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimTicket")
            .field("id", &self.id)
            .field("signed_payload", &self.signed_payload)
            .field("resign_to", &self.resign_to)
            .field("signer", &"<dyn TxSigner>")
            .field("raw", &self.raw)
            .field("wallet_address", &self.wallet_address)
            .finish()
    }
}

struct StoredPresign {
    tx: PreSignedTransaction,
    signer: Arc<dyn TxSigner>,
}

/// Store of pre-signed swap transactions.
pub struct PresignStore {
    feed: Arc<dyn ChainFeed>,
    params: ChainParams,
    gas: GasStrategy,
    ttl_secs: u64,
    swap_deadline_secs: u64,
    events: Arc<EventBus>,
    entries: RwLock<HashMap<String, StoredPresign>>,
}

impl PresignStore {
    /// Create an empty store.
    pub fn new(
        feed: Arc<dyn ChainFeed>,
        params: ChainParams,
        gas: GasStrategy,
        ttl_secs: u64,
        swap_deadline_secs: u64,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            feed,
            params,
            gas,
            ttl_secs,
            swap_deadline_secs,
            events,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Build, sign and store a swap payload for the given rule.
    ///
    /// The swap is the fee-on-transfer-tolerant entry point with a zero
    /// minimum output and a generous deadline; inclusion speed is the whole
    /// point, price protection is explicitly traded away. The nonce is the
    /// wallet's pending count at this moment.
    pub async fn create(
        &self,
        config: &SnipeConfig,
        signer: Arc<dyn TxSigner>,
    ) -> Result<PreSignedTransaction, SnipeError> {
        let estimate = self
            .feed
            .estimate_fees(config.gas_multiplier)
            .await
            .map_err(SnipeError::rpc)?;

        let mut max_fee = estimate.max_fee_per_gas;
        let mut priority = estimate.max_priority_fee_per_gas;
        let bribe = config.bribe_gwei.or(self.gas.priority_fee_gwei);
        if let Some(gwei) = bribe {
            priority = gwei_to_wei(gwei);
        }
        let cap = gwei_to_wei(self.gas.max_gas_gwei);
        if !cap.is_zero() && max_fee > cap {
            max_fee = cap;
        }
        if max_fee < priority {
            max_fee = priority;
        }

        let wallet_address = signer.address();
        let nonce = self
            .feed
            .pending_nonce(wallet_address)
            .await
            .map_err(SnipeError::rpc)?;

        let created_at = now_ts();
        let deadline = U256::from((created_at as u64) + self.swap_deadline_secs);
        // An Any-bound payload carries a placeholder hop and is always
        // rebuilt and re-signed at dispatch time.
        let token = config.target_token.specific().unwrap_or_else(Address::zero);
        let call_data = encode_snipe_swap(
            U256::zero(),
            &[self.params.base_token, token],
            wallet_address,
            deadline,
        );
        let gas_limit = config.gas_limit.unwrap_or(self.gas.default_gas_limit);

        let raw = RawTxFields {
            to: self.params.router,
            call_data: call_data.clone(),
            value: config.amount_in,
            gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
            nonce,
            chain_id: self.params.chain_id,
        };
        let typed = build_typed_tx(&raw);
        let signed_payload = signer
            .sign_transaction(&typed)
            .await
            .map_err(SnipeError::signing)?;

        let tx = PreSignedTransaction {
            id: Uuid::new_v4().to_string(),
            target_token: config.target_token,
            target_deployer: config.target_deployer,
            signed_payload,
            raw_fields: raw,
            wallet_id: config.wallet_id.clone(),
            wallet_address,
            amount_in: config.amount_in,
            created_at,
            expires_at: created_at + self.ttl_secs as i64,
            status: PresignStatus::Ready,
            tx_hash: None,
            error: None,
        };

        info!(
            id = %tx.id,
            wallet = ?wallet_address,
            nonce = %nonce,
            "pre-signed transaction created"
        );
        let snapshot = tx.clone();
        self.entries.write().await.insert(
            tx.id.clone(),
            StoredPresign { tx, signer },
        );
        self.events
            .publish(SniperEvent::PresignedCreated(snapshot.clone()));
        Ok(snapshot)
    }

    /// Atomically claim an entry for execution.
    ///
    /// Exactly one of claim and sweep wins near the expiry boundary, and
    /// exactly one of two racing claims wins; the loser gets a typed error
    /// and no state changes beyond the winner's transition.
    pub async fn claim(
        &self,
        id: &str,
        retarget: Option<Address>,
    ) -> Result<ClaimTicket, SnipeError> {
        self.claim_at(id, retarget, now_ts()).await
    }

    async fn claim_at(
        &self,
        id: &str,
        retarget: Option<Address>,
        now: i64,
    ) -> Result<ClaimTicket, SnipeError> {
        let mut entries = self.entries.write().await;
        let stored = entries.get_mut(id).ok_or(SnipeError::NotFound)?;

        match stored.tx.status {
            PresignStatus::Ready => {}
            PresignStatus::Expired => return Err(SnipeError::Expired),
            found => return Err(SnipeError::InvalidState { found }),
        }
        if now > stored.tx.expires_at {
            stored.tx.status = PresignStatus::Expired;
            debug!(id, "entry expired at claim time");
            return Err(SnipeError::Expired);
        }

        let resign_to = match (stored.tx.target_token, retarget) {
            (TargetFilter::Specific(bound), Some(requested)) if bound == requested => None,
            (_, Some(requested)) => Some(requested),
            (_, None) => None,
        };

        stored.tx.status = PresignStatus::Submitted;
        Ok(ClaimTicket {
            id: stored.tx.id.clone(),
            signed_payload: stored.tx.signed_payload.clone(),
            resign_to,
            signer: stored.signer.clone(),
            raw: stored.tx.raw_fields.clone(),
            wallet_address: stored.tx.wallet_address,
        })
    }

    /// Record a retargeted payload produced by a re-sign, so the stored
    /// fields keep describing exactly what was broadcast.
    pub async fn record_retarget(
        &self,
        id: &str,
        token: Address,
        call_data: Bytes,
        signed_payload: Bytes,
    ) {
        let mut entries = self.entries.write().await;
        if let Some(stored) = entries.get_mut(id) {
            stored.tx.target_token = TargetFilter::Specific(token);
            stored.tx.raw_fields.call_data = call_data;
            stored.tx.signed_payload = signed_payload;
        }
    }

    /// Record the broadcast hash of a claimed entry.
    pub async fn record_submission(&self, id: &str, tx_hash: H256) {
        let mut entries = self.entries.write().await;
        if let Some(stored) = entries.get_mut(id) {
            stored.tx.tx_hash = Some(tx_hash);
        }
    }

    /// Terminal transition `Submitted -> Confirmed`.
    pub async fn mark_confirmed(&self, id: &str, tx_hash: H256) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(stored) if stored.tx.status == PresignStatus::Submitted => {
                stored.tx.status = PresignStatus::Confirmed;
                stored.tx.tx_hash = Some(tx_hash);
            }
            Some(stored) => warn!(
                id,
                status = %stored.tx.status,
                "refusing to confirm entry outside Submitted"
            ),
            None => warn!(id, "confirm for unknown entry"),
        }
    }

    /// Terminal transition `Submitted -> Failed`.
    pub async fn mark_failed(&self, id: &str, error: &str) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(stored) if stored.tx.status == PresignStatus::Submitted => {
                stored.tx.status = PresignStatus::Failed;
                stored.tx.error = Some(error.to_string());
            }
            Some(stored) => warn!(
                id,
                status = %stored.tx.status,
                "refusing to fail entry outside Submitted"
            ),
            None => warn!(id, "failure for unknown entry"),
        }
    }

    /// Expire every `Ready` entry whose TTL has passed.
    ///
    /// Only `Ready` entries are touched; an entry that moved to `Submitted`
    /// is in flight and belongs to its executor.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(now_ts()).await
    }

    async fn sweep_at(&self, now: i64) -> usize {
        let mut entries = self.entries.write().await;
        let mut expired = 0;
        for stored in entries.values_mut() {
            if stored.tx.status == PresignStatus::Ready && now > stored.tx.expires_at {
                stored.tx.status = PresignStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "ttl sweep expired entries");
        }
        expired
    }

    /// Oldest `Ready` entry eligible for the given token.
    ///
    /// Oldest-created-first so stale reservations are consumed before fresh
    /// ones. Entries already past their TTL are skipped; the next sweep or
    /// claim will expire them.
    pub async fn find_ready(&self, target_token: Address) -> Option<String> {
        let now = now_ts();
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|stored| {
                stored.tx.status == PresignStatus::Ready
                    && now <= stored.tx.expires_at
                    && stored.tx.target_token.matches(target_token)
            })
            .min_by_key(|stored| (stored.tx.created_at, stored.tx.id.clone()))
            .map(|stored| stored.tx.id.clone())
    }

    /// Snapshot of a single entry.
    pub async fn get(&self, id: &str) -> Option<PreSignedTransaction> {
        self.entries.read().await.get(id).map(|s| s.tx.clone())
    }

    /// Snapshot of every entry, oldest first.
    pub async fn list(&self) -> Vec<PreSignedTransaction> {
        let entries = self.entries.read().await;
        let mut all: Vec<PreSignedTransaction> = entries.values().map(|s| s.tx.clone()).collect();
        all.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        all
    }

    /// Number of entries currently in `Ready`.
    pub async fn ready_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|s| s.tx.status == PresignStatus::Ready)
            .count()
    }

    #[cfg(test)]
    pub(crate) async fn set_expiry(&self, id: &str, expires_at: i64) {
        if let Some(stored) = self.entries.write().await.get_mut(id) {
            stored.tx.expires_at = expires_at;
        }
    }
}

fn build_typed_tx(raw: &RawTxFields) -> TypedTransaction {
    let request = Eip1559TransactionRequest::new()
        .to(raw.to)
        .value(raw.value)
        .data(raw.call_data.clone())
        .gas(raw.gas_limit)
        .nonce(raw.nonce)
        .max_fee_per_gas(raw.max_fee_per_gas)
        .max_priority_fee_per_gas(raw.max_priority_fee_per_gas)
        .chain_id(raw.chain_id);
    TypedTransaction::Eip1559(request)
}

/// Rebuild and sign the swap for a different target token, reusing the
/// nonce and fees of the original payload.
pub async fn resign_for_token(
    ticket: &ClaimTicket,
    params: &ChainParams,
    swap_deadline_secs: u64,
    token: Address,
) -> Result<(Bytes, Bytes), SnipeError> {
    let deadline = U256::from((now_ts() as u64) + swap_deadline_secs);
    let call_data = encode_snipe_swap(
        U256::zero(),
        &[params.base_token, token],
        ticket.wallet_address,
        deadline,
    );
    let mut raw = ticket.raw.clone();
    raw.call_data = call_data.clone();
    let typed = build_typed_tx(&raw);
    let payload = ticket
        .signer
        .sign_transaction(&typed)
        .await
        .map_err(SnipeError::signing)?;
    Ok((call_data, payload))
}

/// Convert a gwei amount to wei.
fn gwei_to_wei(gwei: f64) -> U256 {
    if gwei <= 0.0 {
        return U256::zero();
    }
    U256::from((gwei * 1e9).round() as u128)
}
