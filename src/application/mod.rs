//! Application Layer
//!
//! - `subscription`: keeps the launchpad log subscription alive
//! - `listing_handler`: decodes listings and buys from every wallet
//! - `monitor`: stop-loss, take-profit and the approval gate
//! - `orchestrator`: wires configuration into running components

pub mod listing_handler;
pub mod monitor;
pub mod orchestrator;
pub mod subscription;

pub use listing_handler::{
    DispatchReport, HandleOutcome, ListingHandler, WalletHandle, WalletOutcome,
};
pub use monitor::{MonitorConfig, PositionMonitor, TickReport};
pub use orchestrator::{load_wallets, LoadedWallet, OrchestratorError, SniperOrchestrator};
pub use subscription::{
    SubscriptionConfig, SubscriptionError, SubscriptionManager, SubscriptionState,
};
