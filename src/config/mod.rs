//! Configuration Module
//!
//! Loads and validates configuration from TOML files, with secrets and
//! endpoint overrides taken from the environment.

pub mod loader;

pub use loader::{
    load_config, parse_wallets, ChainSection, Config, ConfigError, LoggingSection, MonitorSection,
    PersistenceSection, SubscriptionSection, TradingSection, WalletConfig, WalletsSection,
};
