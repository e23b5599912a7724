//! Position Monitor
//!
//! Owns every open position. On a fixed cadence each position is re-valued
//! and checked against the take-profit and stop-loss rules, all under one
//! exclusive lock so a tick never races a registration.

use alloy::primitives::{Address, B256, U256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::position::{Position, PositionKey};
use crate::domain::position_persistence::PositionSnapshot;
use crate::domain::units::{one_unit, NATIVE_DECIMALS};
use crate::ports::chain::with_timeout;
use crate::ports::execution::{ExecutionError, TradeExecutor};

/// Monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Whole-percent drop that triggers a full sell
    pub stop_loss_percent: u64,
    /// Quote-currency value (smallest units) of one token at which take-profit fires
    pub take_profit_price: U256,
    /// Share of the initial amount sold by take-profit
    pub take_profit_sell_percent: u8,
    pub tick_interval: Duration,
    /// Wait between an approval and the sell that needed it
    pub approval_delay: Duration,
    /// Upper bound on every executor call; an expired call counts as failed
    pub call_timeout: Duration,
    /// Where to snapshot positions; `None` disables snapshots
    pub snapshot_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_loss_percent: 20,
            // 0.0002 USDT
            take_profit_price: U256::from(200_000_000_000_000u128),
            take_profit_sell_percent: 70,
            tick_interval: Duration::from_secs(3),
            approval_delay: Duration::from_secs(3),
            call_timeout: Duration::from_secs(10),
            snapshot_path: None,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    /// Positions skipped because balance could not be read or was zero
    pub skipped: usize,
    pub take_profits: usize,
    pub stop_losses: usize,
}

impl TickReport {
    fn changed_state(&self) -> bool {
        self.take_profits > 0 || self.stop_losses > 0
    }
}

struct TrackedPosition {
    position: Position,
    executor: Arc<dyn TradeExecutor>,
}

#[derive(Default)]
struct Evaluation {
    skipped: bool,
    take_profit: bool,
    closed: bool,
}

/// Position monitor. Cheap to clone; clones share the same position set.
#[derive(Clone)]
pub struct PositionMonitor {
    positions: Arc<Mutex<HashMap<PositionKey, TrackedPosition>>>,
    config: Arc<MonitorConfig>,
    shutdown: CancellationToken,
    is_running: Arc<AtomicBool>,
}

impl PositionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            positions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start tracking `token` for one wallet.
    ///
    /// A zero or unreadable balance drops the registration (logged only).
    /// The reference price is the native value of the whole balance, or
    /// `reference_amount` when valuation fails. An existing position with
    /// the same key is replaced.
    pub async fn register(
        &self,
        wallet_index: usize,
        executor: Arc<dyn TradeExecutor>,
        token: Address,
        reference_amount: U256,
    ) {
        let key = PositionKey::new(wallet_index, token);
        let limit = self.config.call_timeout;
        let mut positions = self.positions.lock().await;

        let balance = match with_timeout(limit, executor.token_balance(token)).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(
                    wallet = wallet_index + 1,
                    %token,
                    "Failed to read token balance, not monitoring: {}",
                    e
                );
                return;
            }
        };

        if balance.is_zero() {
            tracing::warn!(
                wallet = wallet_index + 1,
                %token,
                "No token balance found, not monitoring"
            );
            return;
        }

        let valuation = executor.value_in_native(token, balance);
        let reference_price = match with_timeout(limit, valuation).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    wallet = wallet_index + 1,
                    %token,
                    "Failed to value position, using buy amount as reference: {}",
                    e
                );
                reference_amount
            }
        };

        tracing::info!(
            wallet = wallet_index + 1,
            %token,
            %balance,
            reference_wei = %reference_price,
            "Monitoring started (stop-loss {}%)",
            self.config.stop_loss_percent
        );

        if positions.contains_key(&key) {
            tracing::debug!("Replacing existing position {}", key);
        }
        positions.insert(
            key,
            TrackedPosition {
                position: Position::new(key, reference_price, balance),
                executor,
            },
        );

        self.persist(&positions);
    }

    /// Re-insert positions from a snapshot. Positions whose wallet is no
    /// longer configured, or whose key is already live, are skipped.
    pub async fn restore(
        &self,
        restored: Vec<Position>,
        executors: &[Arc<dyn TradeExecutor>],
    ) -> usize {
        let mut positions = self.positions.lock().await;
        let mut count = 0;

        for position in restored {
            let Some(executor) = executors.get(position.wallet_index()) else {
                tracing::warn!(
                    "Snapshot position {} has no configured wallet, skipping",
                    position.key
                );
                continue;
            };
            if positions.contains_key(&position.key) {
                continue;
            }
            tracing::info!(
                "Restored position {} (reference {} wei)",
                position.key,
                position.reference_price
            );
            positions.insert(
                position.key,
                TrackedPosition {
                    position,
                    executor: Arc::clone(executor),
                },
            );
            count += 1;
        }

        count
    }

    /// Evaluate every live position once
    pub async fn tick(&self) -> TickReport {
        let mut positions = self.positions.lock().await;
        let mut report = TickReport::default();
        let mut closed = Vec::new();
        let mut dirty = false;

        for (key, tracked) in positions.iter_mut() {
            if tracked.position.sold {
                closed.push(*key);
                continue;
            }

            report.evaluated += 1;
            let was_approved = tracked.position.approved;
            let outcome = self.evaluate(tracked).await;
            dirty |= tracked.position.approved != was_approved;

            if outcome.skipped {
                report.skipped += 1;
            }
            if outcome.take_profit {
                report.take_profits += 1;
            }
            if outcome.closed {
                report.stop_losses += 1;
                closed.push(*key);
            }
        }

        for key in &closed {
            positions.remove(key);
        }

        if dirty || report.changed_state() || !closed.is_empty() {
            self.persist(&positions);
        }

        report
    }

    async fn evaluate(&self, tracked: &mut TrackedPosition) -> Evaluation {
        let key = tracked.position.key;
        let token = key.token;
        let wallet = key.wallet_index + 1;
        let limit = self.config.call_timeout;
        let mut outcome = Evaluation::default();

        let balance = match with_timeout(limit, tracked.executor.token_balance(token)).await {
            Ok(balance) if !balance.is_zero() => balance,
            Ok(_) => {
                tracing::debug!(wallet, %token, "Zero balance, skipping");
                outcome.skipped = true;
                return outcome;
            }
            Err(e) => {
                tracing::warn!(wallet, %token, "Balance check failed: {}", e);
                outcome.skipped = true;
                return outcome;
            }
        };
        tracked.position.balance = balance;

        if !tracked.position.take_profit_done {
            outcome.take_profit = self.check_take_profit(tracked).await;
        }

        let valuation = tracked.executor.value_in_native(token, tracked.position.balance);
        let current = match with_timeout(limit, valuation).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(wallet, %token, "Valuation failed: {}", e);
                return outcome;
            }
        };

        let drop_pct = tracked.position.drop_percent(current);
        tracing::debug!(
            wallet,
            %token,
            drop_pct,
            "Reference {} wei, now {} wei",
            tracked.position.reference_price,
            current
        );

        if drop_pct < self.config.stop_loss_percent {
            return outcome;
        }

        tracing::warn!(wallet, %token, "STOP-LOSS TRIGGERED: down {}%", drop_pct);
        let amount = tracked.position.balance;
        match self.sell_gated(tracked, amount).await {
            Ok(hash) => {
                tracing::info!(wallet, %token, "Sold {} tokens, tx {}", amount, hash);
                tracked.position.sold = true;
                outcome.closed = true;
            }
            Err(e) => {
                tracing::error!(wallet, %token, "Stop-loss sell failed, retrying next tick: {}", e);
            }
        }

        outcome
    }

    /// Returns true when take-profit fired this tick
    async fn check_take_profit(&self, tracked: &mut TrackedPosition) -> bool {
        let token = tracked.position.token();
        let wallet = tracked.position.wallet_index() + 1;
        let unit = one_unit(NATIVE_DECIMALS).min(tracked.position.balance);
        let quote = tracked.executor.value_in_quote(token, unit);

        let unit_value = match with_timeout(self.config.call_timeout, quote).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(wallet, %token, "Quote valuation failed: {}", e);
                return false;
            }
        };

        if unit_value < self.config.take_profit_price {
            return false;
        }

        tracing::info!(
            wallet,
            %token,
            "TAKE-PROFIT TRIGGERED: unit value {} >= {}",
            unit_value,
            self.config.take_profit_price
        );

        let amount = tracked.position.take_profit_amount(self.config.take_profit_sell_percent);
        if !amount.is_zero() {
            match self.sell_gated(tracked, amount).await {
                Ok(hash) => {
                    tracing::info!(
                        wallet,
                        %token,
                        "Sold {}% of initial amount ({} tokens), tx {}",
                        self.config.take_profit_sell_percent,
                        amount,
                        hash
                    );
                    tracked.position.apply_partial_sell(amount);
                }
                Err(e) => {
                    tracing::error!(wallet, %token, "Take-profit sell failed: {}", e);
                }
            }
        }

        tracked.position.take_profit_done = true;
        true
    }

    /// Approve once per position, then sell
    async fn sell_gated(
        &self,
        tracked: &mut TrackedPosition,
        amount: U256,
    ) -> Result<B256, ExecutionError> {
        let token = tracked.position.token();
        let wallet = tracked.position.wallet_index() + 1;
        let limit = self.config.call_timeout;

        if !tracked.position.approved {
            tracing::info!(wallet, %token, "Approving token for sale");
            let hash = with_timeout(limit, tracked.executor.approve(token, U256::MAX)).await?;
            tracing::info!(wallet, %token, "Approve tx {}", hash);
            tracked.position.approved = true;

            if !self.config.approval_delay.is_zero() {
                tokio::time::sleep(self.config.approval_delay).await;
            }
        }

        with_timeout(limit, tracked.executor.sell(token, amount)).await
    }

    fn persist(&self, positions: &HashMap<PositionKey, TrackedPosition>) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        let snapshot = PositionSnapshot::capture(positions.values().map(|t| &t.position));
        if let Err(e) = snapshot.save(path) {
            tracing::error!("Failed to save position snapshot: {}", e);
        }
    }

    /// Tick until `stop` is called. A tick in progress always completes.
    pub async fn run(&self) {
        self.is_running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Position monitor started (stop-loss {}%, tick {:?})",
            self.config.stop_loss_percent,
            self.config.tick_interval
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; first evaluation is one interval out
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.changed_state() {
                        tracing::info!("Tick: {:?}", report);
                    }
                }
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        tracing::info!("Position monitor stopped");
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
        tracing::info!("Stop signal sent to position monitor");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub async fn position_count(&self) -> usize {
        self.positions.lock().await.len()
    }

    pub async fn position(&self, key: &PositionKey) -> Option<Position> {
        self.positions.lock().await.get(key).map(|t| t.position.clone())
    }

    pub async fn positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self
            .positions
            .lock()
            .await
            .values()
            .map(|t| t.position.clone())
            .collect();
        all.sort_by_key(|p| p.key);
        all
    }
}
