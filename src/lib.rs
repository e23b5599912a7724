//! Listing Sniper - launchpad listing sniper for BNB Smart Chain
//!
//! Buys newly listed tax tokens from several wallets at once and manages
//! their exits with stop-loss and take-profit rules.
//!
//! # Modules
//!
//! - `domain`: Core types (Position, ListingEvent, WalletInfo, snapshots)
//! - `ports`: Trait abstractions (ChainClient, TradeExecutor, TokenClassifier)
//! - `adapters`: External implementations (alloy RPC, PancakeSwap, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Subscription manager, listing handler, position monitor

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
