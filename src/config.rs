//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets and per-deployment values (node URL, signing key, wallet,
//! target token) are referenced by env-var name in the config and
//! resolved at startup. [`AppConfig::validate`] turns the raw file into
//! [`Settings`]; nothing placeholder-like survives that step.

use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Largest value a `uint24` fee tier can hold.
const MAX_POOL_FEE: u32 = 0xFF_FFFF;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub swap: SwapConfig,
    pub gas: GasConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Hour of day (0–23, UTC) at which the purchase fires.
    pub target_hour_utc: u32,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_secs")]
    pub receipt_poll_interval_secs: u64,
    /// Pause after an unanticipated fault before the loop resumes.
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url_env: String,
    pub private_key_env: String,
    pub wallet_address_env: String,
    /// When set, the node must report this chain id at startup.
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwapConfig {
    pub router_address: String,
    pub router_abi_path: String,
    /// Wrapped native token the router swaps from.
    pub input_token: String,
    pub target_token_env: String,
    /// Decimal string in base units (wei).
    pub purchase_amount_wei: String,
    pub pool_fee: u32,
    pub deadline_buffer_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasConfig {
    pub gas_limit: u64,
    pub gas_price_wei: u64,
}

fn default_receipt_timeout_secs() -> u64 {
    300
}

fn default_receipt_poll_interval_secs() -> u64 {
    5
}

fn default_error_pause_secs() -> u64 {
    300
}

fn default_log_file() -> String {
    "dailybuy.log".to_string()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnv(String),

    #[error("{field} still holds a placeholder value: {value}")]
    Placeholder { field: String, value: String },

    #[error("{field} is not a valid address: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("{0} must not be the zero address")]
    ZeroAddress(String),

    #[error("{field} is not a valid amount: {value}")]
    InvalidAmount { field: String, value: String },

    #[error("{field} out of range: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Signing key is invalid: {0}")]
    InvalidKey(String),

    #[error("Wallet address {wallet:?} does not match signing key address {key:?}")]
    KeyMismatch { wallet: Address, key: Address },
}

/// Fully resolved, validated runtime settings. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub agent_name: String,
    pub rpc_url: String,
    pub signing_key: SecretString,
    pub wallet_address: Address,
    pub chain_id: Option<u64>,
    pub router_address: Address,
    pub router_abi_path: PathBuf,
    pub input_token: Address,
    pub target_token: Address,
    pub purchase_amount: U256,
    pub pool_fee: u32,
    pub deadline_buffer: Duration,
    pub target_hour: u32,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub error_pause: Duration,
    pub dry_run: bool,
}

impl Settings {
    /// Build the signing wallet from the configured key.
    pub fn wallet(&self) -> Result<LocalWallet, ConfigError> {
        parse_wallet(&self.signing_key)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve env references from the process environment and validate.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        self.validate_with(|name| std::env::var(name).ok())
    }

    /// Resolve env references through `lookup` and validate every value.
    pub fn validate_with<F>(&self, lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| -> Result<String, ConfigError> {
            let value = lookup(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))?;
            reject_placeholder(name, &value)?;
            Ok(value.trim().to_string())
        };

        let rpc_url = env(&self.chain.rpc_url_env)?;
        let signing_key = SecretString::new(env(&self.chain.private_key_env)?);
        let wallet_address = parse_address(
            &self.chain.wallet_address_env,
            &env(&self.chain.wallet_address_env)?,
        )?;
        let target_token = parse_address(
            &self.swap.target_token_env,
            &env(&self.swap.target_token_env)?,
        )?;

        reject_placeholder("swap.router_address", &self.swap.router_address)?;
        let router_address = parse_address("swap.router_address", &self.swap.router_address)?;
        reject_placeholder("swap.input_token", &self.swap.input_token)?;
        let input_token = parse_address("swap.input_token", &self.swap.input_token)?;
        reject_placeholder("swap.router_abi_path", &self.swap.router_abi_path)?;

        if target_token == input_token {
            return Err(ConfigError::OutOfRange {
                field: "swap.input_token".into(),
                message: "input and target token are the same".into(),
            });
        }

        let purchase_amount =
            parse_amount("swap.purchase_amount_wei", &self.swap.purchase_amount_wei)?;

        if self.agent.target_hour_utc > 23 {
            return Err(ConfigError::OutOfRange {
                field: "agent.target_hour_utc".into(),
                message: format!("{} is not an hour of day (0-23)", self.agent.target_hour_utc),
            });
        }
        if self.swap.pool_fee == 0 || self.swap.pool_fee > MAX_POOL_FEE {
            return Err(ConfigError::OutOfRange {
                field: "swap.pool_fee".into(),
                message: format!("{} is not a valid uint24 fee tier", self.swap.pool_fee),
            });
        }
        if self.swap.deadline_buffer_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "swap.deadline_buffer_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.gas.gas_limit == 0 || self.gas.gas_price_wei == 0 {
            return Err(ConfigError::OutOfRange {
                field: "gas".into(),
                message: "gas_limit and gas_price_wei must be greater than zero".into(),
            });
        }
        if self.agent.receipt_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "agent.receipt_timeout_secs".into(),
                message: "must be greater than zero".into(),
            });
        }

        let key_address = parse_wallet(&signing_key)?.address();
        if key_address != wallet_address {
            return Err(ConfigError::KeyMismatch {
                wallet: wallet_address,
                key: key_address,
            });
        }

        Ok(Settings {
            agent_name: self.agent.name.clone(),
            rpc_url,
            signing_key,
            wallet_address,
            chain_id: self.chain.chain_id,
            router_address,
            router_abi_path: PathBuf::from(&self.swap.router_abi_path),
            input_token,
            target_token,
            purchase_amount,
            pool_fee: self.swap.pool_fee,
            deadline_buffer: Duration::from_secs(self.swap.deadline_buffer_secs),
            target_hour: self.agent.target_hour_utc,
            gas_limit: U256::from(self.gas.gas_limit),
            gas_price: U256::from(self.gas.gas_price_wei),
            receipt_timeout: Duration::from_secs(self.agent.receipt_timeout_secs),
            receipt_poll_interval: Duration::from_secs(
                self.agent.receipt_poll_interval_secs.max(1),
            ),
            error_pause: Duration::from_secs(self.agent.error_pause_secs),
            dry_run: self.agent.dry_run,
        })
    }
}

/// Values shipped in templates that were never filled in.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    let upper = v.to_ascii_uppercase();
    v.is_empty()
        || upper.starts_with("YOUR_")
        || upper.starts_with("YOUR-")
        || upper.contains("CHANGE_ME")
        || upper.contains("CHANGEME")
        || upper == "TODO"
        || upper == "0X..."
        || upper.contains("...")
        || (v.starts_with('<') && v.ends_with('>'))
}

fn reject_placeholder(field: &str, value: &str) -> Result<(), ConfigError> {
    if is_placeholder(value) {
        return Err(ConfigError::Placeholder {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    let address: Address = value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    if address.is_zero() {
        return Err(ConfigError::ZeroAddress(field.to_string()));
    }
    Ok(address)
}

fn parse_amount(field: &str, value: &str) -> Result<U256, ConfigError> {
    reject_placeholder(field, value)?;
    let invalid = || ConfigError::InvalidAmount {
        field: field.to_string(),
        value: value.to_string(),
    };
    let amount = U256::from_dec_str(value.trim().replace('_', "").as_str()).map_err(|_| invalid())?;
    if amount.is_zero() {
        return Err(invalid());
    }
    Ok(amount)
}

fn parse_wallet(key: &SecretString) -> Result<LocalWallet, ConfigError> {
    let raw = key.expose_secret();
    let hex = raw.trim().trim_start_matches("0x");
    hex.parse::<LocalWallet>()
        .map_err(|_| ConfigError::InvalidKey("expected 32-byte hex private key".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
