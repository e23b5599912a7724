use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Chain access error type
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Subscription stream closed")]
    StreamClosed,

    #[error("Client handle is closed")]
    Closed,
}

/// Which logs a subscription should deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic: B256,
}

/// A raw log as delivered by the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

/// Live stream of logs. An `Err` item means the stream failed; the channel
/// closing means the server dropped the subscription.
pub type LogSubscription = mpsc::Receiver<Result<LogEvent, ChainError>>;

/// Capability set of one connection to a chain node.
///
/// Every call may fail or hang; callers apply their own timeouts.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number
    async fn current_height(&self) -> Result<u64, ChainError>;

    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ChainError>;

    /// `eth_call` against the latest block
    async fn call_read_only(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Broadcast an already signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Next nonce for `address`, counting pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    async fn native_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self);
}

/// Opens fresh client handles; used for the first connection and every reconnect.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, ChainError>;
}

/// Await `call` for at most `limit`. An expired call fails with
/// `ChainError::Timeout`, converted into the caller's error type.
pub async fn with_timeout<T, E, F>(limit: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ChainError>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout(limit).into()),
    }
}
