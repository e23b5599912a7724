use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

use super::chain::ChainError;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Chain request failed: {0}")]
    ChainError(#[from] ChainError),
    #[error("Unexpected classification response: {0}")]
    DecodeError(String),
}

/// Answers whether a freshly listed token belongs to the tracked category
#[async_trait]
pub trait TokenClassifier: Send + Sync {
    async fn is_tracked(&self, token: Address) -> Result<bool, ClassifierError>;
}
