use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

use super::chain::ChainError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Chain request failed: {0}")]
    ChainError(#[from] ChainError),
    #[error("Transaction signing failed: {0}")]
    SigningError(String),
    #[error("Failed to decode contract response: {0}")]
    DecodeError(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Quote returned no output for {0}")]
    EmptyQuote(Address),
}

/// Trading capability of one wallet.
///
/// Every mutating call returns the broadcast transaction hash; nothing here
/// waits for the transaction to be mined.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Address trades are sent from
    fn wallet(&self) -> Address;

    /// Spend `native_amount` wei on `token`
    async fn buy(&self, token: Address, native_amount: U256) -> Result<B256, ExecutionError>;

    /// Sell `token_amount` of `token` for native currency
    async fn sell(&self, token: Address, token_amount: U256) -> Result<B256, ExecutionError>;

    /// Allow the router to spend `amount` of `token`
    async fn approve(&self, token: Address, amount: U256) -> Result<B256, ExecutionError>;

    async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError>;

    /// Native currency received for selling `amount` of `token`
    async fn value_in_native(&self, token: Address, amount: U256) -> Result<U256, ExecutionError>;

    /// Quote-currency (stablecoin) value of `amount` of `token`
    async fn value_in_quote(&self, token: Address, amount: U256) -> Result<U256, ExecutionError>;
}
