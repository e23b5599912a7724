//! Recording mocks for the ports, shared by unit and integration tests.
//!
//! Each mock records the calls it receives and answers from scripted state
//! that tests can change while the code under test is running.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use super::chain::{ChainClient, ChainConnector, ChainError, LogEvent, LogFilter, LogSubscription};
use super::classifier::{ClassifierError, TokenClassifier};
use super::execution::{ExecutionError, TradeExecutor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fake_hash(tag: &str, n: u64) -> B256 {
    keccak256(format!("{}:{}", tag, n))
}

// ---------------------------------------------------------------------------
// Chain client
// ---------------------------------------------------------------------------

/// Mock chain client that records calls and serves scripted responses
#[derive(Debug, Default)]
pub struct MockChainClient {
    calls: Mutex<Vec<String>>,
    height: AtomicU64,
    fail_height: AtomicBool,
    hang_height: AtomicBool,
    fail_subscribe: AtomicBool,
    subscriptions: AtomicUsize,
    log_sender: Mutex<Option<mpsc::Sender<Result<LogEvent, ChainError>>>>,
    read_responses: Mutex<HashMap<(Address, [u8; 4]), Bytes>>,
    sent: Mutex<Vec<Bytes>>,
    nonce: AtomicU64,
    chain_id: u64,
    native_balance: Mutex<U256>,
    closed: AtomicBool,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(1),
            chain_id: 56,
            ..Self::default()
        }
    }

    /// Builder method to answer `call_read_only(to, selector ++ ..)` with `response`
    pub fn with_read_response(
        self,
        to: Address,
        selector: [u8; 4],
        response: impl Into<Bytes>,
    ) -> Self {
        lock(&self.read_responses).insert((to, selector), response.into());
        self
    }

    pub fn with_native_balance(self, balance: U256) -> Self {
        *lock(&self.native_balance) = balance;
        self
    }

    pub fn set_height_fails(&self, fails: bool) {
        self.fail_height.store(fails, Ordering::SeqCst);
    }

    /// Make height calls never return, to exercise caller timeouts
    pub fn set_height_hangs(&self, hangs: bool) {
        self.hang_height.store(hangs, Ordering::SeqCst);
    }

    pub fn set_subscribe_fails(&self, fails: bool) {
        self.fail_subscribe.store(fails, Ordering::SeqCst);
    }

    /// Push a log into the current subscription. Returns false when no
    /// subscription is open.
    pub async fn push_log(&self, event: LogEvent) -> bool {
        let sender = lock(&self.log_sender).clone();
        match sender {
            Some(tx) => tx.send(Ok(event)).await.is_ok(),
            None => false,
        }
    }

    /// Make the current subscription report an error
    pub async fn fail_stream(&self, error: ChainError) -> bool {
        let sender = lock(&self.log_sender).clone();
        match sender {
            Some(tx) => tx.send(Err(error)).await.is_ok(),
            None => false,
        }
    }

    /// Close the current subscription from the server side
    pub fn drop_stream(&self) {
        lock(&self.log_sender).take();
    }

    pub fn has_subscription(&self) -> bool {
        lock(&self.log_sender).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        lock(&self.sent).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.record("current_height");
        if self.hang_height.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(ChainError::RpcError("height unavailable".to_string()));
        }
        Ok(self.height.fetch_add(1, Ordering::SeqCst))
    }

    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ChainError> {
        self.record(format!("subscribe_logs:{}", filter.address));
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ChainError::SubscriptionError("subscribe rejected".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        *lock(&self.log_sender) = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn call_read_only(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.record(format!("call_read_only:{}", to));
        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        lock(&self.read_responses)
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| ChainError::RpcError("execution reverted".to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        self.record("send_raw_transaction");
        let hash = keccak256(&raw);
        lock(&self.sent).push(raw);
        Ok(hash)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.nonce.fetch_add(1, Ordering::SeqCst))
    }

    async fn native_balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(*lock(&self.native_balance))
    }

    async fn close(&self) {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.log_sender).take();
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Mock connector handing out scripted clients.
///
/// Queued outcomes are consumed first; once the queue is empty every call
/// returns the fallback client, or fails when there is none.
#[derive(Debug, Default)]
pub struct MockConnector {
    outcomes: Mutex<VecDeque<Option<Arc<MockChainClient>>>>,
    fallback: Option<Arc<MockChainClient>>,
    connect_calls: AtomicUsize,
}

impl MockConnector {
    pub fn new(fallback: Arc<MockChainClient>) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::default()
        }
    }

    /// Connector whose every unscripted attempt fails
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn push_client(&self, client: Arc<MockChainClient>) {
        lock(&self.outcomes).push_back(Some(client));
    }

    pub fn push_failure(&self) {
        lock(&self.outcomes).push_back(None);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, ChainError> {
        let attempt = self.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = match lock(&self.outcomes).pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.clone(),
        };
        match outcome {
            Some(client) => Ok(client as Arc<dyn ChainClient>),
            None => Err(ChainError::ConnectionError(format!(
                "connect attempt {} refused",
                attempt
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeCall {
    Buy { token: Address, amount: U256 },
    Sell { token: Address, amount: U256 },
    Approve { token: Address, amount: U256 },
}

/// Mock wallet executor. Valuations are absolute per token, independent of
/// the requested amount, so tests can move "the price" directly.
#[derive(Debug, Default)]
pub struct MockExecutor {
    wallet: Address,
    calls: Mutex<Vec<TradeCall>>,
    balances: Mutex<HashMap<Address, U256>>,
    native_values: Mutex<HashMap<Address, U256>>,
    quote_values: Mutex<HashMap<Address, U256>>,
    buy_fill: Mutex<U256>,
    buy_delay: Mutex<Duration>,
    failing: Mutex<HashSet<&'static str>>,
    hanging: Mutex<HashSet<&'static str>>,
    completed_buys: AtomicUsize,
    tx_counter: AtomicU64,
}

impl MockExecutor {
    pub fn new(wallet: Address) -> Self {
        Self {
            wallet,
            ..Self::default()
        }
    }

    pub fn with_balance(self, token: Address, balance: U256) -> Self {
        self.set_balance(token, balance);
        self
    }

    pub fn with_native_value(self, token: Address, value: U256) -> Self {
        self.set_native_value(token, value);
        self
    }

    pub fn with_quote_value(self, token: Address, value: U256) -> Self {
        self.set_quote_value(token, value);
        self
    }

    /// Tokens credited to the balance by each successful buy
    pub fn with_buy_fill(self, amount: U256) -> Self {
        *lock(&self.buy_fill) = amount;
        self
    }

    /// Time a buy takes before it resolves, success or failure
    pub fn with_buy_delay(self, delay: Duration) -> Self {
        *lock(&self.buy_delay) = delay;
        self
    }

    /// Make `operation` fail: one of `buy`, `sell`, `approve`, `balance`,
    /// `native`, `quote`
    pub fn failing(self, operation: &'static str) -> Self {
        self.set_failing(operation, true);
        self
    }

    pub fn set_failing(&self, operation: &'static str, fails: bool) {
        let mut failing = lock(&self.failing);
        if fails {
            failing.insert(operation);
        } else {
            failing.remove(operation);
        }
    }

    /// Make `operation` never return, to exercise caller timeouts. Takes the
    /// same names as `failing`.
    pub fn hanging(self, operation: &'static str) -> Self {
        self.set_hanging(operation, true);
        self
    }

    pub fn set_hanging(&self, operation: &'static str, hangs: bool) {
        let mut hanging = lock(&self.hanging);
        if hangs {
            hanging.insert(operation);
        } else {
            hanging.remove(operation);
        }
    }

    pub fn set_balance(&self, token: Address, balance: U256) {
        lock(&self.balances).insert(token, balance);
    }

    pub fn set_native_value(&self, token: Address, value: U256) {
        lock(&self.native_values).insert(token, value);
    }

    pub fn set_quote_value(&self, token: Address, value: U256) {
        lock(&self.quote_values).insert(token, value);
    }

    pub fn balance_of(&self, token: Address) -> U256 {
        lock(&self.balances).get(&token).copied().unwrap_or_default()
    }

    /// Buys that have resolved (either way)
    pub fn completed_buys(&self) -> usize {
        self.completed_buys.load(Ordering::SeqCst)
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<TradeCall> {
        lock(&self.calls).clone()
    }

    pub fn sells(&self) -> Vec<U256> {
        self.get_calls()
            .into_iter()
            .filter_map(|c| match c {
                TradeCall::Sell { amount, .. } => Some(amount),
                _ => None,
            })
            .collect()
    }

    pub fn approvals(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| matches!(c, TradeCall::Approve { .. }))
            .count()
    }

    fn fails(&self, operation: &str) -> bool {
        lock(&self.failing).contains(operation)
    }

    async fn stall_if_hanging(&self, operation: &str) {
        let hangs = lock(&self.hanging).contains(operation);
        if hangs {
            std::future::pending::<()>().await;
        }
    }

    fn scripted_error(operation: &str) -> ExecutionError {
        ExecutionError::ChainError(ChainError::RpcError(format!("scripted {} failure", operation)))
    }

    fn next_hash(&self, tag: &str) -> B256 {
        fake_hash(tag, self.tx_counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl TradeExecutor for MockExecutor {
    fn wallet(&self) -> Address {
        self.wallet
    }

    async fn buy(&self, token: Address, native_amount: U256) -> Result<B256, ExecutionError> {
        lock(&self.calls).push(TradeCall::Buy { token, amount: native_amount });
        self.stall_if_hanging("buy").await;

        let delay = *lock(&self.buy_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed_buys.fetch_add(1, Ordering::SeqCst);

        if self.fails("buy") {
            return Err(Self::scripted_error("buy"));
        }

        let fill = *lock(&self.buy_fill);
        if !fill.is_zero() {
            let mut balances = lock(&self.balances);
            let entry = balances.entry(token).or_default();
            *entry = entry.saturating_add(fill);
        }
        Ok(self.next_hash("buy"))
    }

    async fn sell(&self, token: Address, token_amount: U256) -> Result<B256, ExecutionError> {
        lock(&self.calls).push(TradeCall::Sell { token, amount: token_amount });
        self.stall_if_hanging("sell").await;
        if self.fails("sell") {
            return Err(Self::scripted_error("sell"));
        }

        let mut balances = lock(&self.balances);
        let entry = balances.entry(token).or_default();
        *entry = entry.saturating_sub(token_amount);
        Ok(self.next_hash("sell"))
    }

    async fn approve(&self, token: Address, amount: U256) -> Result<B256, ExecutionError> {
        lock(&self.calls).push(TradeCall::Approve { token, amount });
        self.stall_if_hanging("approve").await;
        if self.fails("approve") {
            return Err(Self::scripted_error("approve"));
        }
        Ok(self.next_hash("approve"))
    }

    async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError> {
        self.stall_if_hanging("balance").await;
        if self.fails("balance") {
            return Err(Self::scripted_error("balance"));
        }
        Ok(self.balance_of(token))
    }

    async fn value_in_native(&self, token: Address, _amount: U256) -> Result<U256, ExecutionError> {
        self.stall_if_hanging("native").await;
        if self.fails("native") {
            return Err(Self::scripted_error("native"));
        }
        lock(&self.native_values)
            .get(&token)
            .copied()
            .ok_or(ExecutionError::EmptyQuote(token))
    }

    async fn value_in_quote(&self, token: Address, _amount: U256) -> Result<U256, ExecutionError> {
        self.stall_if_hanging("quote").await;
        if self.fails("quote") {
            return Err(Self::scripted_error("quote"));
        }
        lock(&self.quote_values)
            .get(&token)
            .copied()
            .ok_or(ExecutionError::EmptyQuote(token))
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Mock classifier: tokens are untracked unless marked otherwise
#[derive(Debug, Default)]
pub struct MockClassifier {
    tracked: Mutex<HashSet<Address>>,
    fail: AtomicBool,
    hang: AtomicBool,
    calls: Mutex<Vec<Address>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracked(self, token: Address) -> Self {
        lock(&self.tracked).insert(token);
        self
    }

    pub fn set_fails(&self, fails: bool) {
        self.fail.store(fails, Ordering::SeqCst);
    }

    pub fn set_hangs(&self, hangs: bool) {
        self.hang.store(hangs, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> Vec<Address> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TokenClassifier for MockClassifier {
    async fn is_tracked(&self, token: Address) -> Result<bool, ClassifierError> {
        lock(&self.calls).push(token);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClassifierError::ChainError(ChainError::Timeout(Duration::from_secs(10))));
        }
        Ok(lock(&self.tracked).contains(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

    #[tokio::test]
    async fn test_mock_executor_records_and_settles() {
        let mock = MockExecutor::new(Address::ZERO).with_buy_fill(U256::from(1000u64));

        mock.buy(TOKEN, U256::from(5u64)).await.unwrap();
        assert_eq!(
            mock.token_balance(TOKEN).await.unwrap(),
            U256::from(1000u64)
        );

        mock.sell(TOKEN, U256::from(700u64)).await.unwrap();
        assert_eq!(mock.balance_of(TOKEN), U256::from(300u64));
        assert_eq!(mock.sells(), vec![U256::from(700u64)]);
        assert_eq!(mock.completed_buys(), 1);
    }

    #[tokio::test]
    async fn test_mock_executor_scripted_failure() {
        let mock = MockExecutor::new(Address::ZERO).failing("approve");
        assert!(mock.approve(TOKEN, U256::MAX).await.is_err());
        mock.set_failing("approve", false);
        assert!(mock.approve(TOKEN, U256::MAX).await.is_ok());
        assert_eq!(mock.approvals(), 2);
    }

    #[tokio::test]
    async fn test_mock_connector_script_then_fallback() {
        let client = Arc::new(MockChainClient::new());
        let connector = MockConnector::new(client.clone());
        connector.push_failure();

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_chain_stream() {
        let client = MockChainClient::new();
        let filter = LogFilter { address: TOKEN, topic: B256::ZERO };
        let mut rx = client.subscribe_logs(filter).await.unwrap();

        let event = LogEvent {
            address: TOKEN,
            topics: vec![],
            data: Bytes::new(),
            tx_hash: None,
            block_number: Some(7),
        };
        assert!(client.push_log(event.clone()).await);
        assert_eq!(rx.recv().await.unwrap().unwrap(), event);

        client.drop_stream();
        assert!(rx.recv().await.is_none());
    }
}
