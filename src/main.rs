//! Listing Sniper - launchpad listing sniper for BNB Smart Chain
//!
//! Buys every new launchpad tax token from all configured wallets and
//! manages exits with stop-loss and take-profit.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use listing_sniper::adapters::bsc::EvmRpcClient;
use listing_sniper::adapters::cli::{CliApp, Command, PositionsCmd, RunCmd, StatusCmd};
use listing_sniper::application::{load_wallets, SniperOrchestrator};
use listing_sniper::config::{load_config, Config};
use listing_sniper::domain::position_persistence::PositionSnapshot;
use listing_sniper::domain::units::{format_units, NATIVE_DECIMALS};
use listing_sniper::ports::chain::ChainClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets (PRIVATE_KEYS) live in .env, not in the TOML file
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config_path = app.command.config_path().to_path_buf();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Run(cmd) => run_command(config, cmd).await,
        Command::Status(cmd) => status_command(config, cmd).await,
        Command::Positions(cmd) => positions_command(config, cmd),
    }
}

/// `--debug` and `--verbose` win over `RUST_LOG`, which wins over the config level
fn init_logging(verbose: bool, debug: bool, level: &str) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run_command(config: Config, cmd: RunCmd) -> Result<()> {
    tracing::info!("Starting listing sniper...");

    let orchestrator = Arc::new(SniperOrchestrator::new(config, cmd.dry_run));

    // Setup Ctrl+C handler
    let orch = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        orch.stop();
    });

    orchestrator.run().await.context("Sniper stopped with an error")?;
    tracing::info!("Listing sniper stopped");
    Ok(())
}

async fn status_command(config: Config, _cmd: StatusCmd) -> Result<()> {
    let wallets = load_wallets(&config)?;
    let client = EvmRpcClient::connect_http(&config.chain.get_http_url())?;
    let chain_id = client.chain_id().await.context("Failed to reach RPC endpoint")?;

    println!("Endpoint:   {} (chain {})", client.endpoint(), chain_id);
    println!("Launchpad:  {}", config.chain.get_launchpad_address()?);
    if config.monitor.enable_stop_loss {
        println!(
            "Exits:      stop-loss {}%, take-profit at {} USDT selling {}%",
            config.monitor.stop_loss_percent,
            config.monitor.take_profit_price_usdt,
            config.monitor.take_profit_sell_percent
        );
    } else {
        println!("Exits:      disabled");
    }
    println!();

    for wallet in &wallets {
        let balance = match client.native_balance(wallet.info.address).await {
            Ok(balance) => format!("{} BNB", format_units(balance, NATIVE_DECIMALS)),
            Err(e) => format!("unavailable ({})", e),
        };
        println!(
            "Wallet {}: {}  balance {}  buy {} BNB",
            wallet.info.label(),
            wallet.info.address,
            balance,
            format_units(wallet.info.buy_amount_wei, NATIVE_DECIMALS)
        );
    }

    client.close().await;
    Ok(())
}

fn positions_command(config: Config, cmd: PositionsCmd) -> Result<()> {
    let path = PositionSnapshot::default_path(&config.persistence.data_dir());
    let Some(snapshot) = PositionSnapshot::load(&path)? else {
        println!("No position snapshot at {}", path.display());
        return Ok(());
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!(
        "Snapshot {} ({} positions)",
        snapshot.saved_at.to_rfc3339(),
        snapshot.positions.len()
    );
    for p in &snapshot.positions {
        println!(
            "Wallet {}  {}  balance {} / {}  ref {} wei  approved={} tp_done={}  opened {}",
            p.wallet_index + 1,
            p.token,
            p.balance,
            p.initial_balance,
            p.reference_price_wei,
            p.approved,
            p.take_profit_done,
            p.opened_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
