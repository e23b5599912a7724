//! Event Subscription Manager
//!
//! Keeps one live log subscription to the launchpad contract, probes it for
//! liveness and rebuilds the connection with linear backoff when it dies.
//! Each received log is handed to the [`ListingHandler`] and processed to
//! completion before the next one is read.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::listing_handler::ListingHandler;
use crate::ports::chain::{with_timeout, ChainClient, ChainConnector, ChainError, LogFilter};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Initial connection failed: {0}")]
    ConnectFailed(#[source] ChainError),

    #[error("Failed to reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Subscribing,
    Active,
    Reconnecting { attempt: u32 },
    Terminated,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Active => write!(f, "active"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub filter: LogFilter,
    pub health_check_interval: Duration,
    pub probe_timeout: Duration,
    /// Delay after failed attempt `n` is `n * reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl SubscriptionConfig {
    pub fn new(filter: LogFilter) -> Self {
        Self {
            filter,
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
        }
    }
}

/// Why an active session ended
enum SessionEnd {
    Cancelled,
    Failed(String),
}

pub struct SubscriptionManager {
    connector: Arc<dyn ChainConnector>,
    client: Arc<dyn ChainClient>,
    handler: ListingHandler,
    config: SubscriptionConfig,
    state: watch::Sender<SubscriptionState>,
}

impl SubscriptionManager {
    /// Open the first connection. Failure here is not retried.
    pub async fn connect(
        connector: Arc<dyn ChainConnector>,
        handler: ListingHandler,
        config: SubscriptionConfig,
    ) -> Result<Self, SubscriptionError> {
        let client = connector
            .connect()
            .await
            .map_err(SubscriptionError::ConnectFailed)?;
        tracing::info!("Connected to chain node");

        let (state, _) = watch::channel(SubscriptionState::Disconnected);
        Ok(Self {
            connector,
            client,
            handler,
            config,
            state,
        })
    }

    /// Watch the connection state
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Run until cancelled (`Ok`) or until reconnection is exhausted.
    ///
    /// Cancellation is observed between units of work; a listing already
    /// being handled finishes first.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SubscriptionError> {
        tracing::info!(
            "Listening for listings on {}",
            self.config.filter.address
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SubscriptionState::Subscribing);
            match self.session(&cancel).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Failed(reason) => {
                    tracing::warn!("Subscription lost: {}", reason);
                }
            }

            match self.reconnect(&cancel).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    tracing::error!("{}", e);
                    self.terminate().await;
                    return Err(e);
                }
            }
        }

        tracing::info!("Subscription manager shutting down");
        self.terminate().await;
        Ok(())
    }

    async fn session(&self, cancel: &CancellationToken) -> SessionEnd {
        let client = Arc::clone(&self.client);
        let mut logs = match client.subscribe_logs(self.config.filter.clone()).await {
            Ok(logs) => logs,
            Err(e) => return SessionEnd::Failed(format!("subscribe failed: {}", e)),
        };
        self.set_state(SubscriptionState::Active);
        tracing::info!("Subscription active");

        let period = self.config.health_check_interval;
        let mut health = interval_at(Instant::now() + period, period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                item = logs.recv() => match item {
                    Some(Ok(log)) => {
                        self.handler.handle_log(&log).await;
                    }
                    Some(Err(e)) => return SessionEnd::Failed(format!("subscription error: {}", e)),
                    None => return SessionEnd::Failed("stream closed".to_string()),
                },
                _ = health.tick() => {
                    match self.probe(client.as_ref()).await {
                        Ok(height) => tracing::debug!("Health check ok, block {}", height),
                        Err(e) => return SessionEnd::Failed(format!("health check failed: {}", e)),
                    }
                }
            }
        }
    }

    async fn probe(&self, client: &dyn ChainClient) -> Result<u64, ChainError> {
        with_timeout(self.config.probe_timeout, client.current_height()).await
    }

    /// `Ok(true)` on a fresh healthy client, `Ok(false)` when cancelled
    async fn reconnect(&mut self, cancel: &CancellationToken) -> Result<bool, SubscriptionError> {
        self.client.close().await;
        let max = self.config.max_reconnect_attempts;

        for attempt in 1..=max {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            self.set_state(SubscriptionState::Reconnecting { attempt });
            tracing::info!("Reconnecting... attempt {}/{}", attempt, max);

            match self.try_connect().await {
                Ok(client) => {
                    self.client = client;
                    tracing::info!("Reconnected");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!("Reconnect attempt {} failed: {}", attempt, e);
                }
            }

            if attempt < max {
                let delay = self.config.reconnect_base_delay * attempt;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(false),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(SubscriptionError::ReconnectExhausted { attempts: max })
    }

    async fn try_connect(&self) -> Result<Arc<dyn ChainClient>, ChainError> {
        let client = self.connector.connect().await?;
        if let Err(e) = self.probe(client.as_ref()).await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn terminate(&mut self) {
        self.client.close().await;
        self.set_state(SubscriptionState::Terminated);
    }

    fn set_state(&self, state: SubscriptionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Subscription state {} -> {}", previous, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::ListingEvent;
    use crate::ports::chain::LogEvent;
    use crate::ports::mocks::{MockChainClient, MockClassifier, MockConnector};
    use alloy::primitives::{address, Address, Bytes, U256};

    const CONTRACT: Address = address!("5c952063c7fc8610ffdb798152d69f0b9550762b");

    fn fast_config() -> SubscriptionConfig {
        SubscriptionConfig {
            filter: LogFilter {
                address: CONTRACT,
                topic: ListingEvent::topic(),
            },
            health_check_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(20),
            reconnect_base_delay: Duration::from_millis(1),
            max_reconnect_attempts: 3,
        }
    }

    fn handler(classifier: Arc<MockClassifier>) -> ListingHandler {
        ListingHandler::new(vec![], classifier, None, Duration::ZERO)
    }

    async fn wait_for(rx: &mut watch::Receiver<SubscriptionState>, want: SubscriptionState) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached in time")
            .expect("state channel closed");
    }

    fn listing_log() -> LogEvent {
        let event = ListingEvent {
            base: address!("00000000000000000000000000000000000000aa"),
            offers: U256::from(1u64),
            quote: Address::ZERO,
            funds: U256::from(1u64),
        };
        LogEvent {
            address: CONTRACT,
            topics: vec![ListingEvent::topic()],
            data: Bytes::from(event.encode()),
            tx_hash: None,
            block_number: None,
        }
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_fatal() {
        let connector = Arc::new(MockConnector::failing());
        let result = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await;

        assert!(matches!(result, Err(SubscriptionError::ConnectFailed(_))));
        assert_eq!(connector.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_logs_are_handed_to_handler() {
        let client = Arc::new(MockChainClient::new());
        let connector = Arc::new(MockConnector::new(client.clone()));
        let classifier = Arc::new(MockClassifier::new());

        let mut manager =
            SubscriptionManager::connect(connector, handler(classifier.clone()), fast_config())
                .await
                .unwrap();
        let mut state = manager.state();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        wait_for(&mut state, SubscriptionState::Active).await;
        assert!(client.push_log(listing_log()).await);

        tokio::time::timeout(Duration::from_secs(2), async {
            while classifier.get_calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(*state.borrow(), SubscriptionState::Terminated);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_stream_close_triggers_resubscribe() {
        let first = Arc::new(MockChainClient::new());
        let second = Arc::new(MockChainClient::new());
        let connector = Arc::new(MockConnector::new(second.clone()));
        connector.push_client(first.clone());

        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await
        .unwrap();
        let mut state = manager.state();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        wait_for(&mut state, SubscriptionState::Active).await;
        first.drop_stream();

        tokio::time::timeout(Duration::from_secs(2), async {
            while second.subscription_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(first.is_closed());
        assert_eq!(connector.connect_calls(), 2);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stream_error_triggers_reconnect() {
        let first = Arc::new(MockChainClient::new());
        let second = Arc::new(MockChainClient::new());
        let connector = Arc::new(MockConnector::new(second.clone()));
        connector.push_client(first.clone());

        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await
        .unwrap();
        let mut state = manager.state();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        wait_for(&mut state, SubscriptionState::Active).await;
        assert!(first.fail_stream(ChainError::SubscriptionError("reset".into())).await);

        tokio::time::timeout(Duration::from_secs(2), async {
            while second.subscription_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_hung_probe_forces_reconnect() {
        let first = Arc::new(MockChainClient::new());
        let second = Arc::new(MockChainClient::new());
        let connector = Arc::new(MockConnector::new(second.clone()));
        connector.push_client(first.clone());
        first.set_height_hangs(true);

        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while second.subscription_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(first.is_closed());
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_is_fatal() {
        let first = Arc::new(MockChainClient::new());
        first.set_subscribe_fails(true);
        let connector = Arc::new(MockConnector::failing());
        connector.push_client(first);

        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await
        .unwrap();
        let state = manager.state();

        let result = manager.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(SubscriptionError::ReconnectExhausted { attempts: 3 })));
        assert_eq!(connector.connect_calls(), 1 + 3);
        assert_eq!(*state.borrow(), SubscriptionState::Terminated);
    }

    #[tokio::test]
    async fn test_failed_probe_on_new_client_counts_as_attempt() {
        let first = Arc::new(MockChainClient::new());
        first.set_subscribe_fails(true);
        let unhealthy = Arc::new(MockChainClient::new());
        unhealthy.set_height_fails(true);
        let healthy = Arc::new(MockChainClient::new());

        let connector = Arc::new(MockConnector::new(healthy.clone()));
        connector.push_client(first);
        connector.push_client(unhealthy.clone());

        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            fast_config(),
        )
        .await
        .unwrap();
        let mut state = manager.state();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        wait_for(&mut state, SubscriptionState::Active).await;
        assert!(unhealthy.is_closed());
        assert_eq!(healthy.subscription_count(), 1);
        assert_eq!(connector.connect_calls(), 3);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_returns_ok() {
        let first = Arc::new(MockChainClient::new());
        first.set_subscribe_fails(true);
        let connector = Arc::new(MockConnector::failing());
        connector.push_client(first);

        let mut config = fast_config();
        config.reconnect_base_delay = Duration::from_secs(60);
        let mut manager = SubscriptionManager::connect(
            connector.clone(),
            handler(Arc::new(MockClassifier::new())),
            config,
        )
        .await
        .unwrap();
        let mut state = manager.state();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { manager.run(cancel).await }
        });

        wait_for(&mut state, SubscriptionState::Reconnecting { attempt: 1 }).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(connector.connect_calls(), 2);
    }
}
