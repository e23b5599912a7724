use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::pubsub::Subscription;
use alloy::rpc::types::{Filter, Log, TransactionInput, TransactionRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ports::chain::{
    ChainClient, ChainConnector, ChainError, LogEvent, LogFilter, LogSubscription,
};

/// Logs buffered between the websocket and the consumer
const LOG_BUFFER: usize = 256;

/// Chain client over an alloy provider (websocket or HTTP)
#[derive(Clone)]
pub struct EvmRpcClient {
    provider: DynProvider,
    endpoint: String,
    shutdown: CancellationToken,
}

impl EvmRpcClient {
    /// Dial a websocket endpoint. Required for log subscriptions.
    pub async fn connect_ws(url: &str) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(url))
            .await
            .map_err(|e| ChainError::ConnectionError(format!("{}: {}", url, e)))?;

        tracing::debug!("Websocket connected: {}", url);
        Ok(Self::from_provider(provider.erased(), url))
    }

    /// HTTP client for reads and transaction submission
    pub fn connect_http(url: &str) -> Result<Self, ChainError> {
        let parsed = url
            .parse()
            .map_err(|e| ChainError::ConnectionError(format!("invalid URL {}: {}", url, e)))?;
        let provider = ProviderBuilder::new().connect_http(parsed);
        Ok(Self::from_provider(provider.erased(), url))
    }

    fn from_provider(provider: DynProvider, endpoint: &str) -> Self {
        Self {
            provider,
            endpoint: endpoint.to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ensure_open(&self) -> Result<(), ChainError> {
        if self.shutdown.is_cancelled() {
            return Err(ChainError::Closed);
        }
        Ok(())
    }
}

fn rpc_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::RpcError(e.to_string())
}

/// Upstream of the log forwarder
#[async_trait]
trait LogSource: Send {
    async fn next_log(&mut self) -> Result<Log, RecvError>;
}

#[async_trait]
impl LogSource for Subscription<Log> {
    async fn next_log(&mut self) -> Result<Log, RecvError> {
        self.recv().await
    }
}

/// Any upstream receive error ends the stream. A lagged receiver has
/// already dropped logs, so the consumer must resubscribe.
fn stream_error(error: RecvError) -> ChainError {
    match error {
        RecvError::Lagged(skipped) => {
            ChainError::SubscriptionError(format!("lagged, {} log(s) skipped", skipped))
        }
        RecvError::Closed => ChainError::StreamClosed,
    }
}

/// Pump logs from `source` into `tx` until cancelled, the consumer goes
/// away, or the source fails. The receiver observes a closed channel once
/// this returns.
async fn forward_logs<S: LogSource>(
    mut source: S,
    tx: mpsc::Sender<Result<LogEvent, ChainError>>,
    shutdown: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = source.next_log() => item,
        };
        match item {
            Ok(log) => {
                if tx.send(Ok(to_log_event(log))).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let error = stream_error(e);
                tracing::warn!("Log subscription ended: {}", error);
                let _ = tx.send(Err(error)).await;
                break;
            }
        }
    }
    tracing::debug!("Log forwarder stopped");
}

fn to_log_event(log: Log) -> LogEvent {
    LogEvent {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        tx_hash: log.transaction_hash,
        block_number: log.block_number,
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.ensure_open()?;
        self.provider.get_block_number().await.map_err(rpc_err)
    }

    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ChainError> {
        self.ensure_open()?;
        let filter = Filter::new()
            .address(filter.address)
            .event_signature(filter.topic);

        let sub = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainError::SubscriptionError(e.to_string()))?;

        let (tx, rx) = mpsc::channel(LOG_BUFFER);
        tokio::spawn(forward_logs(sub, tx, self.shutdown.clone()));

        Ok(rx)
    }

    async fn call_read_only(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.ensure_open()?;
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(data),
            ..Default::default()
        };
        self.provider.call(request).await.map_err(rpc_err)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        self.ensure_open()?;
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(rpc_err)?;
        Ok(*pending.tx_hash())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.ensure_open()?;
        self.provider.get_chain_id().await.map_err(rpc_err)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        self.ensure_open()?;
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(rpc_err)
    }

    async fn native_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.ensure_open()?;
        self.provider.get_balance(address).await.map_err(rpc_err)
    }

    async fn close(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!("Closing client for {}", self.endpoint);
            self.shutdown.cancel();
        }
    }
}

/// Opens a new websocket client per call, bounded by a dial timeout
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    dial_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            dial_timeout,
        }
    }
}

#[async_trait]
impl ChainConnector for WsConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, ChainError> {
        let client = tokio::time::timeout(self.dial_timeout, EvmRpcClient::connect_ws(&self.url))
            .await
            .map_err(|_| ChainError::Timeout(self.dial_timeout))??;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;
    use tokio_test::{assert_err, assert_ok};

    #[async_trait]
    impl LogSource for broadcast::Receiver<Log> {
        async fn next_log(&mut self) -> Result<Log, RecvError> {
            self.recv().await
        }
    }

    fn log_at(block: u64) -> Log {
        Log {
            block_number: Some(block),
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_error_mapping() {
        assert!(matches!(
            stream_error(RecvError::Lagged(3)),
            ChainError::SubscriptionError(msg) if msg.contains("3 log(s) skipped")
        ));
        assert!(matches!(stream_error(RecvError::Closed), ChainError::StreamClosed));
    }

    #[tokio::test]
    async fn test_forwarder_delivers_logs_in_order() {
        let (upstream, source) = broadcast::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        upstream.send(log_at(1)).unwrap();
        upstream.send(log_at(2)).unwrap();
        drop(upstream);

        forward_logs(source, tx, CancellationToken::new()).await;

        assert_eq!(assert_ok!(rx.recv().await.unwrap()).block_number, Some(1));
        assert_eq!(assert_ok!(rx.recv().await.unwrap()).block_number, Some(2));
        assert!(matches!(rx.recv().await, Some(Err(ChainError::StreamClosed))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_forwarder_reports_error_and_stops() {
        let (upstream, source) = broadcast::channel(1);
        let (tx, mut rx) = mpsc::channel(8);
        for block in 1..=3 {
            upstream.send(log_at(block)).unwrap();
        }

        forward_logs(source, tx, CancellationToken::new()).await;

        let error = assert_err!(rx.recv().await.unwrap());
        assert!(matches!(error, ChainError::SubscriptionError(_)));
        assert!(rx.recv().await.is_none());
        drop(upstream);
    }

    #[tokio::test]
    async fn test_cancelled_forwarder_closes_channel() {
        let (_upstream, source) = broadcast::channel::<Log>(1);
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        forward_logs(source, tx, shutdown).await;
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_http_client_rejects_bad_url() {
        assert!(matches!(
            EvmRpcClient::connect_http("not a url"),
            Err(ChainError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_client_refuses_calls() {
        let client = assert_ok!(EvmRpcClient::connect_http("http://127.0.0.1:1"));
        client.close().await;
        assert!(matches!(assert_err!(client.current_height().await), ChainError::Closed));
        assert!(matches!(client.chain_id().await, Err(ChainError::Closed)));
    }

    #[tokio::test]
    async fn test_ws_connector_unreachable_host() {
        let connector = WsConnector::new("ws://127.0.0.1:1", Duration::from_secs(2));
        assert!(connector.connect().await.is_err());
    }
}
