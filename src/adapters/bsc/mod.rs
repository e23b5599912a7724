//! BNB Smart Chain adapters
//!
//! - `rpc`: alloy-backed chain client and websocket connector
//! - `swapper`: PancakeSwap V2 trade executor
//! - `token_manager`: launchpad tax-token classifier
//! - `wallet`: private key loading and legacy transaction signing

pub mod contracts;
pub mod rpc;
pub mod swapper;
pub mod token_manager;
pub mod wallet;

pub use rpc::{EvmRpcClient, WsConnector};
pub use swapper::{PancakeSwapper, SwapSettings};
pub use token_manager::TokenManagerClassifier;
pub use wallet::{WalletError, WalletSigner};
