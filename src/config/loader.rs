//! Configuration Loader
//!
//! Loads and validates the TOML configuration. Private keys never live in
//! the file: they come from `PRIVATE_KEYS` in the environment (or `.env`).

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainSection,
    #[serde(default)]
    pub wallets: WalletsSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub subscription: SubscriptionSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Chain endpoints and the launchpad contract
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    /// Websocket endpoint used for the log subscription
    pub ws_url: String,
    /// HTTP endpoint used for reads and transaction submission
    pub http_url: String,
    /// Launchpad contract emitting `LiquidityAdded`
    pub launchpad_address: String,
    /// Timeout for dialing a websocket connection
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
}

/// Non-empty value of an environment variable
fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ChainSection {
    /// Checks BSC_WS_URL first, falls back to config value
    pub fn get_ws_url(&self) -> String {
        env_override("BSC_WS_URL").unwrap_or_else(|| self.ws_url.clone())
    }

    /// Checks BSC_HTTP_URL first, falls back to config value
    pub fn get_http_url(&self) -> String {
        env_override("BSC_HTTP_URL").unwrap_or_else(|| self.http_url.clone())
    }

    /// Checks CONTRACT_ADDRESS first, falls back to config value
    pub fn get_launchpad_address(&self) -> Result<Address, ConfigError> {
        let raw =
            env_override("CONTRACT_ADDRESS").unwrap_or_else(|| self.launchpad_address.clone());
        Address::from_str(raw.trim()).map_err(|e| {
            ConfigError::ValidationError(format!("launchpad_address '{}' is invalid: {}", raw, e))
        })
    }
}

/// Wallet defaults. Keys and per-wallet amounts come from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletsSection {
    /// Buy amount for wallets without an entry in BUY_AMOUNTS_BNB
    #[serde(default = "default_buy_amount_bnb")]
    pub default_buy_amount_bnb: Decimal,
}

impl Default for WalletsSection {
    fn default() -> Self {
        Self {
            default_buy_amount_bnb: default_buy_amount_bnb(),
        }
    }
}

/// Transaction parameters
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: u64,
    /// Tolerated output shortfall in whole percent
    #[serde(default = "default_slippage_percent")]
    pub slippage_percent: u8,
    /// Apply `slippage_percent` as a minimum output; off means any output is accepted
    #[serde(default)]
    pub enforce_slippage: bool,
    /// Upper bound on each buy, sell, approve, balance, quote and classification call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            gas_price_gwei: default_gas_price_gwei(),
            slippage_percent: default_slippage_percent(),
            enforce_slippage: false,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// Position monitor (stop-loss / take-profit)
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_true")]
    pub enable_stop_loss: bool,
    /// Whole-percent drop from the reference value that triggers a full sell
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: u64,
    /// USDT value of one token at which take-profit fires
    #[serde(default = "default_take_profit_price_usdt")]
    pub take_profit_price_usdt: Decimal,
    /// Share of the initial amount sold by take-profit
    #[serde(default = "default_take_profit_sell_percent")]
    pub take_profit_sell_percent: u8,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Wait after an approval before the sell that needed it
    #[serde(default = "default_approval_delay_secs")]
    pub approval_delay_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            enable_stop_loss: true,
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_price_usdt: default_take_profit_price_usdt(),
            take_profit_sell_percent: default_take_profit_sell_percent(),
            tick_interval_secs: default_tick_interval_secs(),
            approval_delay_secs: default_approval_delay_secs(),
        }
    }
}

/// Event subscription and reconnect policy
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSection {
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Reconnect delay is `attempt * reconnect_base_delay_secs`
    #[serde(default = "default_reconnect_base_delay_secs")]
    pub reconnect_base_delay_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Wait after a buy before reading the new balance
    #[serde(default = "default_settlement_delay_secs")]
    pub settlement_delay_secs: u64,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            reconnect_base_delay_secs: default_reconnect_base_delay_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            settlement_delay_secs: default_settlement_delay_secs(),
        }
    }
}

/// Position snapshot settings
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: default_data_dir(),
        }
    }
}

impl PersistenceSection {
    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_dial_timeout_secs() -> u64 {
    10
}
fn default_buy_amount_bnb() -> Decimal {
    Decimal::new(1, 1)
}
fn default_gas_limit() -> u64 {
    300_000
}
fn default_gas_price_gwei() -> u64 {
    5
}
fn default_slippage_percent() -> u8 {
    10
}
fn default_call_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_stop_loss_percent() -> u64 {
    20
}
fn default_take_profit_price_usdt() -> Decimal {
    Decimal::new(2, 4)
}
fn default_take_profit_sell_percent() -> u8 {
    70
}
fn default_tick_interval_secs() -> u64 {
    3
}
fn default_approval_delay_secs() -> u64 {
    3
}
fn default_health_check_interval_secs() -> u64 {
    30
}
fn default_probe_timeout_secs() -> u64 {
    10
}
fn default_reconnect_base_delay_secs() -> u64 {
    5
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_settlement_delay_secs() -> u64 {
    5
}
fn default_data_dir() -> String {
    "~/.listing-sniper".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),
}

/// Key and buy amount for one wallet, in configured order
#[derive(Clone, PartialEq)]
pub struct WalletConfig {
    pub private_key: String,
    pub buy_amount_bnb: Decimal,
}

impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("private_key", &"<redacted>")
            .field("buy_amount_bnb", &self.buy_amount_bnb)
            .finish()
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Pair comma separated keys with comma separated amounts by position.
///
/// Empty keys are skipped. A wallet without an amount (or with an empty
/// one) gets `default_amount`.
pub fn parse_wallets(
    keys: &str,
    amounts: Option<&str>,
    default_amount: Decimal,
) -> Result<Vec<WalletConfig>, ConfigError> {
    let amounts: Vec<&str> = amounts
        .map(|a| a.split(',').map(str::trim).collect())
        .unwrap_or_default();

    let mut wallets = Vec::new();
    for (i, key) in keys.split(',').enumerate() {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let buy_amount_bnb = match amounts.get(i).filter(|a| !a.is_empty()) {
            Some(raw) => Decimal::from_str(raw).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "BUY_AMOUNTS_BNB entry {} '{}': {}",
                    i + 1,
                    raw,
                    e
                ))
            })?,
            None => default_amount,
        };

        if buy_amount_bnb <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "buy amount for wallet {} must be > 0, got {}",
                i + 1,
                buy_amount_bnb
            )));
        }

        wallets.push(WalletConfig {
            private_key: key.to_string(),
            buy_amount_bnb,
        });
    }

    if wallets.is_empty() {
        return Err(ConfigError::ValidationError("no private keys configured".to_string()));
    }
    Ok(wallets)
}

fn check_url(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if schemes.iter().any(|s| url.starts_with(s)) {
        return Ok(());
    }
    Err(ConfigError::ValidationError(format!(
        "{} must start with one of {:?}, got '{}'",
        field, schemes, url
    )))
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Chain
        check_url("ws_url", &self.chain.ws_url, &["ws://", "wss://"])?;
        check_url("http_url", &self.chain.http_url, &["http://", "https://"])?;
        Address::from_str(self.chain.launchpad_address.trim()).map_err(|e| {
            ConfigError::ValidationError(format!(
                "launchpad_address '{}' is invalid: {}",
                self.chain.launchpad_address, e
            ))
        })?;

        // Wallets
        if self.wallets.default_buy_amount_bnb <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "default_buy_amount_bnb must be > 0, got {}",
                self.wallets.default_buy_amount_bnb
            )));
        }

        // Trading
        if self.trading.gas_limit == 0 {
            return Err(ConfigError::ValidationError("gas_limit must be > 0".to_string()));
        }

        if self.trading.gas_price_gwei == 0 {
            return Err(ConfigError::ValidationError("gas_price_gwei must be > 0".to_string()));
        }

        if self.trading.slippage_percent > 100 {
            return Err(ConfigError::ValidationError(format!(
                "slippage_percent must be 0-100, got {}",
                self.trading.slippage_percent
            )));
        }

        if self.trading.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("call_timeout_secs must be > 0".to_string()));
        }

        // Monitor
        if self.monitor.stop_loss_percent == 0 || self.monitor.stop_loss_percent > 100 {
            return Err(ConfigError::ValidationError(format!(
                "stop_loss_percent must be 1-100, got {}",
                self.monitor.stop_loss_percent
            )));
        }

        if self.monitor.take_profit_sell_percent == 0
            || self.monitor.take_profit_sell_percent > 100
        {
            return Err(ConfigError::ValidationError(format!(
                "take_profit_sell_percent must be 1-100, got {}",
                self.monitor.take_profit_sell_percent
            )));
        }

        if self.monitor.take_profit_price_usdt <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "take_profit_price_usdt must be > 0, got {}",
                self.monitor.take_profit_price_usdt
            )));
        }

        if self.monitor.tick_interval_secs == 0 {
            return Err(ConfigError::ValidationError("tick_interval_secs must be > 0".to_string()));
        }

        // Subscription
        if self.subscription.max_reconnect_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_reconnect_attempts must be > 0".to_string(),
            ));
        }

        if self.subscription.health_check_interval_secs == 0
            || self.subscription.probe_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "health_check_interval_secs and probe_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.persistence.enabled && self.persistence.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty when persistence is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Wallets from PRIVATE_KEYS and BUY_AMOUNTS_BNB
    pub fn wallets(&self) -> Result<Vec<WalletConfig>, ConfigError> {
        let keys =
            std::env::var("PRIVATE_KEYS").map_err(|_| ConfigError::MissingEnv("PRIVATE_KEYS"))?;
        let amounts = env_override("BUY_AMOUNTS_BNB");
        parse_wallets(
            &keys,
            amounts.as_deref(),
            self.wallets.default_buy_amount_bnb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[chain]
ws_url = "wss://bsc-ws-node.nariox.org:443"
http_url = "https://bsc-dataseed.binance.org/"
launchpad_address = "0x5c952063c7fc8610FFDB798152D69F0B9550762b"

[wallets]
default_buy_amount_bnb = "0.05"

[trading]
gas_limit = 350000
gas_price_gwei = 3
slippage_percent = 15

[monitor]
stop_loss_percent = 25
take_profit_price_usdt = "0.0005"

[persistence]
enabled = false

[logging]
level = "debug"
"#
        .to_string()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.wallets.default_buy_amount_bnb, dec!(0.05));
        assert_eq!(config.trading.gas_limit, 350_000);
        assert_eq!(config.trading.slippage_percent, 15);
        assert!(!config.trading.enforce_slippage);
        assert_eq!(config.monitor.stop_loss_percent, 25);
        assert_eq!(config.monitor.take_profit_price_usdt, dec!(0.0005));
        assert!(!config.persistence.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_defaults_applied() {
        let minimal = r#"
[chain]
ws_url = "wss://example.org"
http_url = "https://example.org"
launchpad_address = "0x5c952063c7fc8610FFDB798152D69F0B9550762b"
"#;
        let file = write_config(minimal);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.wallets.default_buy_amount_bnb, dec!(0.1));
        assert_eq!(config.trading.gas_limit, 300_000);
        assert_eq!(config.trading.gas_price_gwei, 5);
        assert_eq!(config.trading.call_timeout_secs, 10);
        assert!(config.monitor.enable_stop_loss);
        assert_eq!(config.monitor.stop_loss_percent, 20);
        assert_eq!(config.monitor.take_profit_price_usdt, dec!(0.0002));
        assert_eq!(config.monitor.take_profit_sell_percent, 70);
        assert_eq!(config.monitor.tick_interval_secs, 3);
        assert_eq!(config.subscription.health_check_interval_secs, 30);
        assert_eq!(config.subscription.probe_timeout_secs, 10);
        assert_eq!(config.subscription.reconnect_base_delay_secs, 5);
        assert_eq!(config.subscription.max_reconnect_attempts, 10);
        assert_eq!(config.subscription.settlement_delay_secs, 5);
        assert!(config.persistence.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_missing_chain_section() {
        let file = write_config("[logging]\nlevel = \"info\"\n");
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_zero_stop_loss_rejected() {
        let content =
            create_valid_config().replace("stop_loss_percent = 25", "stop_loss_percent = 0");
        let file = write_config(&content);
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_call_timeout_rejected() {
        let content = create_valid_config().replace(
            "slippage_percent = 15",
            "slippage_percent = 15\ncall_timeout_secs = 0",
        );
        let file = write_config(&content);
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bad_ws_url_rejected() {
        let content = create_valid_config().replace("wss://bsc-ws-node", "https://bsc-ws-node");
        let file = write_config(&content);
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bad_launchpad_address_rejected() {
        let content = create_valid_config().replace(
            "0x5c952063c7fc8610FFDB798152D69F0B9550762b",
            "0x1234",
        );
        let file = write_config(&content);
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_parse_wallets_pairs_by_position() {
        let wallets = parse_wallets("k1, k2,k3", Some("0.2,,0.3"), dec!(0.1)).unwrap();
        assert_eq!(wallets.len(), 3);
        assert_eq!(wallets[0].buy_amount_bnb, dec!(0.2));
        assert_eq!(wallets[1].buy_amount_bnb, dec!(0.1));
        assert_eq!(wallets[2].buy_amount_bnb, dec!(0.3));
        assert_eq!(wallets[1].private_key, "k2");
    }

    #[test]
    fn test_parse_wallets_missing_amounts_use_default() {
        let wallets = parse_wallets("k1,k2", None, dec!(0.25)).unwrap();
        assert!(wallets.iter().all(|w| w.buy_amount_bnb == dec!(0.25)));
    }

    #[test]
    fn test_parse_wallets_skips_empty_keys() {
        let wallets = parse_wallets("k1,,k3", Some("0.1,0.2,0.3"), dec!(0.1)).unwrap();
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[1].private_key, "k3");
        assert_eq!(wallets[1].buy_amount_bnb, dec!(0.3));
    }

    #[test]
    fn test_parse_wallets_rejects_garbage() {
        assert!(parse_wallets("", None, dec!(0.1)).is_err());
        assert!(parse_wallets("k1", Some("abc"), dec!(0.1)).is_err());
        assert!(parse_wallets("k1", Some("-1"), dec!(0.1)).is_err());
    }

    #[test]
    fn test_wallet_config_debug_redacts_key() {
        let wallet = WalletConfig {
            private_key: "deadbeef".to_string(),
            buy_amount_bnb: dec!(0.1),
        };
        assert!(!format!("{:?}", wallet).contains("deadbeef"));
    }

    #[test]
    fn test_data_dir_expands_tilde() {
        let section = PersistenceSection::default();
        assert!(!section.data_dir().to_string_lossy().starts_with('~'));
    }
}
