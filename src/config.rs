//! Configuration module for the sniping engine
//!
//! Defines the configuration structures for the engine: chain parameters,
//! gas policy, lifecycle knobs and optional startup snipe rules. Addresses
//! are stored as strings in the file and parsed once at engine construction.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ethers::types::U256;
use ethers::utils::parse_ether;
use serde::{Deserialize, Serialize};

use crate::types::{parse_address, SnipeConfig, TargetFilter};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chain the engine instance is bound to.
    pub chain: ChainConfig,

    /// Gas pricing policy for pre-signed payloads.
    pub gas: GasStrategy,

    /// Seconds a pre-signed entry stays claimable after creation.
    pub presign_ttl_secs: u64,

    /// Swap deadline baked into the calldata, seconds from signing.
    /// Generous on purpose, the payload may sit unused for a while.
    pub swap_deadline_secs: u64,

    /// Interval of the periodic TTL sweep, seconds.
    pub sweep_interval_secs: u64,

    /// Confirmations to wait for after broadcast.
    pub confirmations: usize,

    /// Upper bound on the confirmation wait, seconds.
    pub confirmation_timeout_secs: u64,

    /// Buffered capacity of the lifecycle event channel.
    pub event_channel_capacity: usize,

    /// Snipe rules loaded into the registry at startup.
    #[serde(default)]
    pub snipes: Vec<SnipeEntryConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chain: default_bsc_config(),
            gas: GasStrategy::default(),
            presign_ttl_secs: 900,
            swap_deadline_secs: 3600,
            sweep_interval_secs: 60,
            confirmations: 1,
            confirmation_timeout_secs: 120,
            event_channel_capacity: 256,
            snipes: Vec::new(),
        }
    }
}

/// Chain-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID.
    pub chain_id: u64,

    /// Chain name.
    pub name: String,

    /// Websocket endpoint used for block subscriptions and RPC.
    pub ws_url: String,

    /// HTTP RPC endpoints, informational fallback list.
    pub rpc_urls: Vec<String>,

    /// Native token symbol.
    pub native_token: String,

    /// Native token decimals.
    pub native_decimals: u8,

    /// Wrapped native token address. Pairs not involving it are ignored.
    pub wrapped_native: String,

    /// Router used to build swap calldata.
    pub router: String,

    /// Known pair factories and their DEX identity.
    pub factories: Vec<FactoryConfig>,
}

/// A watched factory contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Factory contract address.
    pub address: String,

    /// DEX identity, e.g. "pancake_v2".
    pub dex: String,
}

/// Gas pricing strategy for pre-signed payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasStrategy {
    /// Multiplier applied to the node's fee estimate.
    pub gas_multiplier: f64,

    /// Gas limit used when a rule does not override it.
    pub default_gas_limit: u64,

    /// Priority-fee override in gwei, applied when set.
    pub priority_fee_gwei: Option<f64>,

    /// Cap on the max fee per gas, gwei.
    pub max_gas_gwei: f64,
}

impl Default for GasStrategy {
    fn default() -> Self {
        Self {
            gas_multiplier: 1.25,
            default_gas_limit: 400_000,
            priority_fee_gwei: None,
            max_gas_gwei: 300.0,
        }
    }
}

/// A snipe rule as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipeEntryConfig {
    /// Whether the rule starts enabled.
    pub enabled: bool,

    /// Deployer address to watch, any deployer when unset.
    pub target_deployer: Option<String>,

    /// Token address to buy, any token when unset.
    pub target_token: Option<String>,

    /// DEX identity the rule applies to.
    pub dex: String,

    /// Amount of the native asset to swap in, in whole units.
    pub amount_in_native: f64,

    /// Owning wallet identifier.
    pub wallet_id: String,

    /// Gas limit override.
    pub gas_limit: Option<u64>,

    /// Fee multiplier override.
    pub gas_multiplier: Option<f64>,

    /// Priority-fee override in gwei.
    pub bribe_gwei: Option<f64>,
}

impl SnipeEntryConfig {
    /// Materialize the file entry into a registry rule with a fresh id.
    pub fn to_snipe_config(&self, default_multiplier: f64) -> Result<SnipeConfig> {
        let target_deployer = match &self.target_deployer {
            Some(raw) => TargetFilter::Specific(
                parse_address(raw).context("invalid target_deployer in config")?,
            ),
            None => TargetFilter::Any,
        };
        let target_token = match &self.target_token {
            Some(raw) => {
                TargetFilter::Specific(parse_address(raw).context("invalid target_token in config")?)
            }
            None => TargetFilter::Any,
        };
        let amount_in: U256 = parse_ether(self.amount_in_native)
            .context("invalid amount_in_native in config")?;

        let mut config = SnipeConfig::new(
            target_deployer,
            target_token,
            self.dex.clone(),
            amount_in,
            self.wallet_id.clone(),
        );
        config.enabled = self.enabled;
        config.gas_limit = self.gas_limit;
        config.gas_multiplier = self.gas_multiplier.unwrap_or(default_multiplier);
        config.bribe_gwei = self.bribe_gwei;
        Ok(config)
    }
}

/// Ready-made configuration for BNB Smart Chain.
pub fn default_bsc_config() -> ChainConfig {
    ChainConfig {
        chain_id: 56,
        name: "BSC".to_string(),
        ws_url: "wss://bsc-ws-node.nariox.org:443".to_string(),
        rpc_urls: vec!["https://bsc-dataseed.binance.org".to_string()],
        native_token: "BNB".to_string(),
        native_decimals: 18,
        wrapped_native: "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c".to_string(), // WBNB
        router: "0x10ED43C718714eb63d5aA57B78B54704E256024E".to_string(), // PancakeSwap V2
        factories: vec![
            FactoryConfig {
                address: "0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73".to_string(),
                dex: "pancake_v2".to_string(),
            },
            FactoryConfig {
                address: "0x858E3312ed3A876947EA49d572A7C42DE08af7EE".to_string(),
                dex: "biswap".to_string(),
            },
        ],
    }
}

/// Ready-made configuration for Ethereum mainnet.
pub fn default_ethereum_config() -> ChainConfig {
    ChainConfig {
        chain_id: 1,
        name: "Ethereum".to_string(),
        ws_url: "wss://eth.llamarpc.com".to_string(),
        rpc_urls: vec!["https://eth.llamarpc.com".to_string()],
        native_token: "ETH".to_string(),
        native_decimals: 18,
        wrapped_native: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(), // WETH
        router: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string(), // Uniswap V2
        factories: vec![
            FactoryConfig {
                address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string(),
                dex: "uniswap_v2".to_string(),
            },
            FactoryConfig {
                address: "0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac".to_string(),
                dex: "sushiswap".to_string(),
            },
        ],
    }
}

/// Load an engine configuration from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: EngineConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Write an engine configuration to a YAML file, creating parent directories.
pub fn save_config(path: impl AsRef<Path>, config: &EngineConfig) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
    }
    let raw = serde_yaml::to_string(config).context("failed to serialize config")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}
