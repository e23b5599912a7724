//! Sniper Orchestrator
//!
//! Turns a validated [`Config`] into running components: one signer and
//! executor per wallet, the tax-token classifier, the position monitor and
//! the subscription manager. Runs until Ctrl+C or a fatal subscription error.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::listing_handler::{ListingHandler, WalletHandle};
use super::monitor::{MonitorConfig, PositionMonitor};
use super::subscription::{SubscriptionConfig, SubscriptionError, SubscriptionManager};
use crate::adapters::bsc::{
    EvmRpcClient, PancakeSwapper, SwapSettings, TokenManagerClassifier, WalletError, WalletSigner,
    WsConnector,
};
use crate::config::{Config, ConfigError};
use crate::domain::listing::ListingEvent;
use crate::domain::position_persistence::{PositionSnapshot, RecoveryStatus};
use crate::domain::units::{format_units, to_base_units, UnitsError, NATIVE_DECIMALS};
use crate::domain::wallet::WalletInfo;
use crate::ports::chain::{ChainClient, ChainError, LogFilter};
use crate::ports::execution::TradeExecutor;

/// USDT on BSC uses 18 decimals
const QUOTE_DECIMALS: u32 = 18;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Wallet error: {0}")]
    WalletError(#[from] WalletError),
    #[error("Amount error: {0}")]
    UnitsError(#[from] UnitsError),
    #[error("Chain error: {0}")]
    ChainError(#[from] ChainError),
    #[error("Subscription error: {0}")]
    SubscriptionError(#[from] SubscriptionError),
}

impl From<&Config> for SwapSettings {
    fn from(config: &Config) -> Self {
        Self {
            gas_limit: config.trading.gas_limit,
            gas_price_gwei: config.trading.gas_price_gwei,
            slippage_percent: config.trading.slippage_percent,
            enforce_slippage: config.trading.enforce_slippage,
            dry_run: false,
        }
    }
}

impl TryFrom<&Config> for MonitorConfig {
    type Error = OrchestratorError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let monitor = &config.monitor;
        let snapshot_path = config
            .persistence
            .enabled
            .then(|| PositionSnapshot::default_path(&config.persistence.data_dir()));

        Ok(Self {
            stop_loss_percent: monitor.stop_loss_percent,
            take_profit_price: to_base_units(monitor.take_profit_price_usdt, QUOTE_DECIMALS)?,
            take_profit_sell_percent: monitor.take_profit_sell_percent,
            tick_interval: Duration::from_secs(monitor.tick_interval_secs),
            approval_delay: Duration::from_secs(monitor.approval_delay_secs),
            call_timeout: Duration::from_secs(config.trading.call_timeout_secs),
            snapshot_path,
        })
    }
}

impl TryFrom<&Config> for SubscriptionConfig {
    type Error = OrchestratorError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let sub = &config.subscription;
        Ok(Self {
            filter: LogFilter {
                address: config.chain.get_launchpad_address()?,
                topic: ListingEvent::topic(),
            },
            health_check_interval: Duration::from_secs(sub.health_check_interval_secs),
            probe_timeout: Duration::from_secs(sub.probe_timeout_secs),
            reconnect_base_delay: Duration::from_secs(sub.reconnect_base_delay_secs),
            max_reconnect_attempts: sub.max_reconnect_attempts,
        })
    }
}

/// A signer paired with its wallet info, loaded from the environment
pub struct LoadedWallet {
    pub info: WalletInfo,
    pub signer: WalletSigner,
}

/// Load every configured wallet, in order
pub fn load_wallets(config: &Config) -> Result<Vec<LoadedWallet>, OrchestratorError> {
    config
        .wallets()?
        .into_iter()
        .enumerate()
        .map(|(index, wallet)| {
            let signer = WalletSigner::from_hex(index, &wallet.private_key)?;
            let info = WalletInfo::new(index, signer.address(), wallet.buy_amount_bnb)?;
            Ok(LoadedWallet { info, signer })
        })
        .collect()
}

pub struct SniperOrchestrator {
    config: Config,
    dry_run: bool,
    shutdown: CancellationToken,
}

impl SniperOrchestrator {
    pub fn new(config: Config, dry_run: bool) -> Self {
        Self {
            config,
            dry_run,
            shutdown: CancellationToken::new(),
        }
    }

    /// Request a graceful shutdown
    pub fn stop(&self) {
        self.shutdown.cancel();
        tracing::info!("Stop signal sent to orchestrator");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(&self) -> Result<(), OrchestratorError> {
        let config = &self.config;
        let wallets = load_wallets(config)?;

        let http_url = config.chain.get_http_url();
        let http: Arc<dyn ChainClient> = Arc::new(EvmRpcClient::connect_http(&http_url)?);
        let chain_id = http.chain_id().await?;
        tracing::info!("Connected to chain {} via {}", chain_id, http_url);

        let mut settings = SwapSettings::from(config);
        settings.dry_run = self.dry_run;
        if settings.slippage_percent > 0 && !settings.enforce_slippage {
            tracing::warn!(
                "slippage_percent = {} is not enforced; swaps accept any output \
                 (set enforce_slippage = true)",
                settings.slippage_percent
            );
        }
        if settings.dry_run {
            tracing::warn!("DRY RUN MODE - transactions are signed but never broadcast");
        }

        let mut handles = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            match http.native_balance(wallet.info.address).await {
                Ok(balance) => tracing::info!(
                    "Wallet {}: {} balance {} BNB, buy {} BNB",
                    wallet.info.label(),
                    wallet.info.address,
                    format_units(balance, NATIVE_DECIMALS),
                    format_units(wallet.info.buy_amount_wei, NATIVE_DECIMALS)
                ),
                Err(e) => tracing::warn!(
                    "Wallet {}: failed to read balance: {}",
                    wallet.info.label(),
                    e
                ),
            }

            let executor: Arc<dyn TradeExecutor> = Arc::new(PancakeSwapper::new(
                Arc::clone(&http),
                wallet.signer,
                settings.clone(),
                chain_id,
            ));
            handles.push(WalletHandle {
                info: wallet.info,
                executor,
            });
        }
        tracing::info!("Loaded {} wallets", handles.len());

        let monitor = if config.monitor.enable_stop_loss {
            let monitor = PositionMonitor::new(MonitorConfig::try_from(config)?);
            if let Some(path) = &monitor.config().snapshot_path {
                let executors: Vec<Arc<dyn TradeExecutor>> =
                    handles.iter().map(|h| Arc::clone(&h.executor)).collect();
                match PositionSnapshot::try_recover(path) {
                    RecoveryStatus::NoSnapshot => {
                        tracing::debug!("No position snapshot at {}", path.display())
                    }
                    RecoveryStatus::Recovered(positions) => {
                        let restored = monitor.restore(positions, &executors).await;
                        tracing::info!("Restored {} positions from {}", restored, path.display());
                    }
                    RecoveryStatus::Corrupted(reason) => {
                        tracing::error!(
                            "Ignoring corrupted position snapshot {}: {}",
                            path.display(),
                            reason
                        );
                    }
                }
            }
            tracing::info!(
                "Stop-loss enabled: {}%, take-profit at {} USDT selling {}%",
                config.monitor.stop_loss_percent,
                config.monitor.take_profit_price_usdt,
                config.monitor.take_profit_sell_percent
            );
            Some(monitor)
        } else {
            tracing::info!("Stop-loss disabled; buys will not be monitored");
            None
        };

        let monitor_task = monitor.clone().map(|m| tokio::spawn(async move { m.run().await }));

        let handler = ListingHandler::new(
            handles,
            Arc::new(TokenManagerClassifier::new(Arc::clone(&http))),
            monitor.clone(),
            Duration::from_secs(config.subscription.settlement_delay_secs),
        )
        .with_call_timeout(Duration::from_secs(config.trading.call_timeout_secs));

        let connector = Arc::new(WsConnector::new(
            config.chain.get_ws_url(),
            Duration::from_secs(config.chain.dial_timeout_secs),
        ));
        let sub_config = SubscriptionConfig::try_from(config)?;
        let result = match SubscriptionManager::connect(connector, handler, sub_config).await {
            Ok(mut manager) => manager.run(self.shutdown.clone()).await,
            Err(e) => Err(e),
        };

        if let Some(monitor) = &monitor {
            monitor.stop();
        }
        if let Some(task) = monitor_task {
            if let Err(e) = task.await {
                tracing::error!("Position monitor task failed: {}", e);
            }
        }
        http.close().await;

        result?;
        tracing::info!("Sniper orchestrator stopped");
        Ok(())
    }
}
