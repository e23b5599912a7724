//! Ports Layer - Trait definitions for external dependencies
//!
//! Adapters implement these traits; the application layer only ever sees
//! `Arc<dyn _>` handles to them:
//! - Chain access (height, log subscriptions, calls, raw transactions)
//! - Trade execution for one wallet
//! - Token classification

pub mod chain;
pub mod classifier;
pub mod execution;
pub mod mocks;

pub use chain::{ChainClient, ChainConnector, ChainError, LogEvent, LogFilter, LogSubscription};
pub use classifier::{ClassifierError, TokenClassifier};
pub use execution::{ExecutionError, TradeExecutor};
