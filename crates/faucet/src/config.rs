//! Faucet configuration

use crate::eligibility::{EligibilityPolicy, SignerPolicy};
use crate::error::{FaucetError, FaucetResult};
use crate::evm::{EvmSettings, TxOptions, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_INTERVAL};
use crate::network::{EvmNetwork, VocdoniNetwork};
use crate::signer::SignerPool;
use crate::vocdoni::VocdoniSettings;
use serde::{Deserialize, Serialize};
use spigot_common::utils::config::{load_config, save_config};
use spigot_common::utils::logging::LoggingConfig;
use spigot_crypto::KeyPair;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Whole service configuration, stored as `<data_dir>/faucet.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LoggingConfig,
    pub api: ApiConfig,
    pub faucet: FaucetConfig,
}

impl Config {
    pub const FILE_NAME: &'static str = "faucet.toml";
    pub const ENV_PREFIX: &'static str = "FAUCET";
    pub const DATA_DIR_NAME: &'static str = ".faucet";

    const LIST_KEYS: [&'static str; 3] = ["api.whitelist", "faucet.evm_endpoints", "faucet.evm_priv_keys"];

    /// `~/.faucet`
    pub fn default_data_dir() -> anyhow::Result<PathBuf> {
        Self::data_dir_under(dirs::home_dir())
    }

    fn data_dir_under(home: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        let home = home.ok_or_else(|| anyhow::anyhow!("cannot find home directory, pass --data-dir"))?;
        Ok(home.join(Self::DATA_DIR_NAME))
    }

    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(Self::FILE_NAME)
    }

    /// Reads `<data_dir>/faucet.toml` (optional) overlaid with `FAUCET_*`
    /// environment variables.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        load_config(Self::path(data_dir), Self::ENV_PREFIX, &Self::LIST_KEYS)
    }

    pub fn save(&self, data_dir: &Path) -> anyhow::Result<()> {
        save_config(self, Self::path(data_dir))
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base path the faucet routes are mounted under
    pub route: String,
    pub listen_host: String,
    pub listen_port: u16,
    /// Bearer tokens (UUIDs) allowed to call the faucet routes
    pub whitelist: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            route: "/".to_string(),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8000,
            whitelist: Vec::new(),
        }
    }
}

impl ApiConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

/// Conditions a recipient must meet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConditions {
    /// Recipients holding this many wei or more are refused
    pub balance: String,
    pub challenge: bool,
}

impl Default for SendConditions {
    fn default() -> Self {
        Self {
            balance: "100".to_string(),
            challenge: false,
        }
    }
}

/// Dispensing settings for both modes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    pub enable_evm: bool,
    pub enable_vocdoni: bool,

    pub evm_network: String,
    pub evm_endpoints: Vec<String>,
    /// Hex private keys, one per signer, in scan order
    pub evm_priv_keys: Vec<String>,
    /// Amount per transfer (in wei)
    pub evm_amount: String,
    pub evm_timeout_secs: u64,
    pub evm_gas_limit: u64,
    /// Fixed gas price (in wei); the endpoint suggestion is used when unset
    pub evm_gas_price: Option<String>,
    /// Funds each signer keeps on top of amount and fee (in wei)
    pub evm_signer_reserve: String,

    /// How long an API request may wait for a free signer
    pub dispatch_timeout_secs: u64,
    pub retry_interval_secs: u64,
    pub poll_interval_secs: u64,
    /// Unset waits for confirmation indefinitely
    pub confirmation_timeout_secs: Option<u64>,

    pub vocdoni_network: String,
    pub vocdoni_priv_key: String,
    pub vocdoni_amount: u64,

    pub send_conditions: SendConditions,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            enable_evm: true,
            enable_vocdoni: true,
            evm_network: String::new(),
            evm_endpoints: Vec::new(),
            evm_priv_keys: Vec::new(),
            evm_amount: "1".to_string(),
            evm_timeout_secs: 10,
            evm_gas_limit: 21_000,
            evm_gas_price: None,
            evm_signer_reserve: "0".to_string(),
            dispatch_timeout_secs: 60,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            confirmation_timeout_secs: None,
            vocdoni_network: String::new(),
            vocdoni_priv_key: String::new(),
            vocdoni_amount: 100,
            send_conditions: SendConditions::default(),
        }
    }
}

fn parse_wei(field: &str, value: &str) -> FaucetResult<u128> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|e| FaucetError::InvalidAmount(format!("{} {:?}: {}", field, value, e)))
}

fn positive_secs(field: &str, secs: u64) -> FaucetResult<Duration> {
    if secs == 0 {
        return Err(FaucetError::InvalidTimeout(format!("{} must be positive", field)));
    }
    Ok(Duration::from_secs(secs))
}

impl FaucetConfig {
    pub fn evm_network(&self) -> FaucetResult<EvmNetwork> {
        self.evm_network.parse()
    }

    pub fn vocdoni_network(&self) -> FaucetResult<VocdoniNetwork> {
        self.vocdoni_network.parse()
    }

    pub fn policy(&self) -> FaucetResult<EligibilityPolicy> {
        Ok(EligibilityPolicy {
            max_recipient_balance: parse_wei("send_conditions.balance", &self.send_conditions.balance)?,
            challenge: self.send_conditions.challenge,
        })
    }

    pub fn dispatch_timeout(&self) -> FaucetResult<Duration> {
        positive_secs("dispatch_timeout_secs", self.dispatch_timeout_secs)
    }

    /// Validated EVM settings.
    pub fn evm_settings(&self) -> FaucetResult<EvmSettings> {
        let amount = parse_wei("evm_amount", &self.evm_amount)?;
        let gas_price = self
            .evm_gas_price
            .as_deref()
            .map(|p| parse_wei("evm_gas_price", p))
            .transpose()?;
        let confirmation_timeout = self
            .confirmation_timeout_secs
            .map(|s| positive_secs("confirmation_timeout_secs", s))
            .transpose()?;

        let settings = EvmSettings {
            endpoints: self.evm_endpoints.clone(),
            amount,
            policy: self.policy()?,
            signer_policy: SignerPolicy {
                reserve: parse_wei("evm_signer_reserve", &self.evm_signer_reserve)?,
            },
            tx_options: TxOptions {
                gas_limit: self.evm_gas_limit,
                gas_price,
            },
            timeout: positive_secs("evm_timeout_secs", self.evm_timeout_secs)?,
            retry_interval: positive_secs("retry_interval_secs", self.retry_interval_secs)?,
            poll_interval: positive_secs("poll_interval_secs", self.poll_interval_secs)?,
            confirmation_timeout,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn evm_signer_pool(&self) -> FaucetResult<SignerPool> {
        SignerPool::from_private_keys(&self.evm_priv_keys)
    }

    pub fn vocdoni_settings(&self) -> FaucetResult<VocdoniSettings> {
        if self.vocdoni_amount == 0 {
            return Err(FaucetError::InvalidAmount("vocdoni_amount must be greater than zero".to_string()));
        }
        Ok(VocdoniSettings {
            amount: self.vocdoni_amount,
            policy: self.policy()?,
        })
    }

    pub fn vocdoni_keys(&self) -> FaucetResult<KeyPair> {
        if self.vocdoni_priv_key.trim().is_empty() {
            return Err(FaucetError::InvalidSigner("no vocdoni private key configured".to_string()));
        }
        KeyPair::from_private_key_hex(self.vocdoni_priv_key.trim())
            .map_err(|e| FaucetError::InvalidSigner(format!("vocdoni key: {}", e)))
    }
}
