//! Listing event handling: decode, classify, buy from every wallet.

use alloy::primitives::{Address, B256};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::monitor::PositionMonitor;
use crate::domain::listing::ListingEvent;
use crate::domain::wallet::WalletInfo;
use crate::ports::chain::{with_timeout, LogEvent};
use crate::ports::classifier::TokenClassifier;
use crate::ports::execution::TradeExecutor;

/// A configured wallet together with the executor that trades for it
#[derive(Clone)]
pub struct WalletHandle {
    pub info: WalletInfo,
    pub executor: Arc<dyn TradeExecutor>,
}

/// Result of one wallet's buy attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOutcome {
    Bought(B256),
    Failed(String),
    /// The buy task died without reporting
    Aborted,
}

/// Per-wallet outcomes for one listing, ordered by wallet index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub token: Address,
    pub outcomes: Vec<(usize, WalletOutcome)>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, WalletOutcome::Bought(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// What happened to one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    DecodeFailed,
    ClassificationFailed(Address),
    NotTracked(Address),
    Dispatched(DispatchReport),
}

/// Bound on a classification or buy call unless configured otherwise
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ListingHandler {
    wallets: Arc<[WalletHandle]>,
    classifier: Arc<dyn TokenClassifier>,
    /// `None` when stop-loss monitoring is disabled: buys still happen
    monitor: Option<PositionMonitor>,
    settlement_delay: Duration,
    call_timeout: Duration,
}

impl ListingHandler {
    pub fn new(
        wallets: Vec<WalletHandle>,
        classifier: Arc<dyn TokenClassifier>,
        monitor: Option<PositionMonitor>,
        settlement_delay: Duration,
    ) -> Self {
        Self {
            wallets: wallets.into(),
            classifier,
            monitor,
            settlement_delay,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Builder method to bound each classification and buy call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn wallets(&self) -> &[WalletHandle] {
        &self.wallets
    }

    /// Process one log to completion, including every wallet's buy and
    /// registration. Failures are logged and reported, never propagated.
    pub async fn handle_log(&self, log: &LogEvent) -> HandleOutcome {
        let event = match ListingEvent::decode(&log.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to decode listing event: {}", e);
                return HandleOutcome::DecodeFailed;
            }
        };

        tracing::info!(
            token = %event.base,
            offers = %event.offers,
            quote = %event.quote,
            funds = %event.funds,
            tx = ?log.tx_hash,
            "=== LiquidityAdded ==="
        );

        match with_timeout(self.call_timeout, self.classifier.is_tracked(event.base)).await {
            Ok(true) => {
                tracing::info!("Token {} is a tax token, buying", event.base);
            }
            Ok(false) => {
                tracing::info!("Token {} is not a tax token, skipping", event.base);
                return HandleOutcome::NotTracked(event.base);
            }
            Err(e) => {
                tracing::warn!("Failed to classify {}: {}", event.base, e);
                return HandleOutcome::ClassificationFailed(event.base);
            }
        }

        HandleOutcome::Dispatched(self.dispatch(event.base).await)
    }

    /// Buy `token` from every wallet concurrently and wait for all of them.
    ///
    /// Each wallet task that buys successfully waits for settlement and
    /// registers its position before finishing, so returning means every
    /// registration has happened.
    pub async fn dispatch(&self, token: Address) -> DispatchReport {
        let mut tasks = JoinSet::new();

        for wallet in self.wallets.iter() {
            let wallet = wallet.clone();
            let monitor = self.monitor.clone();
            let settlement_delay = self.settlement_delay;
            let call_timeout = self.call_timeout;

            tasks.spawn(async move {
                let index = wallet.info.index;
                let outcome =
                    buy_and_register(wallet, token, monitor, settlement_delay, call_timeout).await;
                (index, outcome)
            });
        }

        let mut pending: BTreeSet<usize> = self.wallets.iter().map(|w| w.info.index).collect();
        let mut outcomes = Vec::with_capacity(self.wallets.len());

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    pending.remove(&index);
                    outcomes.push((index, outcome));
                }
                Err(e) => {
                    tracing::error!("Buy task for {} died: {}", token, e);
                }
            }
        }

        outcomes.extend(pending.into_iter().map(|index| (index, WalletOutcome::Aborted)));
        outcomes.sort_by_key(|(index, _)| *index);

        let report = DispatchReport { token, outcomes };
        tracing::info!(
            "Dispatch for {} finished: {} bought, {} failed",
            token,
            report.succeeded(),
            report.failed()
        );
        report
    }
}

async fn buy_and_register(
    wallet: WalletHandle,
    token: Address,
    monitor: Option<PositionMonitor>,
    settlement_delay: Duration,
    call_timeout: Duration,
) -> WalletOutcome {
    let label = wallet.info.label();
    let amount = wallet.info.buy_amount_wei;
    tracing::info!(wallet = label, %token, "Buying with {} wei", amount);

    let tx = match with_timeout(call_timeout, wallet.executor.buy(token, amount)).await {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!(wallet = label, %token, "Buy failed: {}", e);
            return WalletOutcome::Failed(e.to_string());
        }
    };
    tracing::info!(
        wallet = label,
        %token,
        "Buy sent: {} (https://bscscan.com/tx/{})",
        tx,
        tx
    );

    if let Some(monitor) = monitor {
        if !settlement_delay.is_zero() {
            tokio::time::sleep(settlement_delay).await;
        }
        monitor
            .register(wallet.info.index, wallet.executor, token, amount)
            .await;
    }

    WalletOutcome::Bought(tx)
}
