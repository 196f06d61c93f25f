//! Pair-creation log decoding
//!
//! Maps known factory addresses to their DEX identity and decodes raw
//! `PairCreated` logs into structured events. Decode failures are values,
//! never panics, so one malformed log cannot stop a block scan.

use std::collections::HashMap;

use ethers::types::Address;

use crate::chain_adapters::LogView;
use crate::config::FactoryConfig;
use crate::errors::SnipeError;
use crate::types::parse_address;

use super::router::PAIR_CREATED_TOPIC;

/// Token pair extracted from a `PairCreated` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPairCreated {
    /// First token of the pair.
    pub token0: Address,
    /// Second token of the pair.
    pub token1: Address,
    /// Address of the new pair contract.
    pub pair: Address,
}

/// Registry of known pair factories.
pub struct FactoryRegistry {
    factories: HashMap<Address, String>,
}

impl FactoryRegistry {
    /// Build the registry from configuration entries. Unparseable addresses
    /// are rejected up front rather than silently ignored at scan time.
    pub fn from_config(entries: &[FactoryConfig]) -> Result<Self, SnipeError> {
        let mut factories = HashMap::with_capacity(entries.len());
        for entry in entries {
            factories.insert(parse_address(&entry.address)?, entry.dex.clone());
        }
        Ok(Self { factories })
    }

    /// DEX identity of a factory, if it is known.
    pub fn dex_for(&self, factory: Address) -> Option<&str> {
        self.factories.get(&factory).map(String::as_str)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Decode a `PairCreated` log.
///
/// Layout: topic0 is the event signature, topics 1 and 2 carry the indexed
/// token addresses, the first data word carries the pair address.
pub fn decode_pair_created(log: &LogView) -> Result<DecodedPairCreated, SnipeError> {
    if log.topics.len() != 3 {
        return Err(SnipeError::Decode(format!(
            "expected 3 topics, found {}",
            log.topics.len()
        )));
    }
    if log.topics[0] != *PAIR_CREATED_TOPIC {
        return Err(SnipeError::Decode(format!(
            "unexpected topic0 {:?}",
            log.topics[0]
        )));
    }
    if log.data.len() < 32 {
        return Err(SnipeError::Decode(format!(
            "data too short for pair address: {} bytes",
            log.data.len()
        )));
    }

    let token0 = Address::from_slice(&log.topics[1].as_bytes()[12..]);
    let token1 = Address::from_slice(&log.topics[2].as_bytes()[12..]);
    let pair = Address::from_slice(&log.data[12..32]);

    Ok(DecodedPairCreated {
        token0,
        token1,
        pair,
    })
}
