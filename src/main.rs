use alerter::{TelegramAlerter, run_alerter_service};
use anyhow::Context;
use api_client::{ApiClient, BinanceClient, RetryPolicy};
use clap::{Args, Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, TradingDirection, TradingMode, init_logging, load_config_from};
use engine::{ACCOUNT_INFO_PREFIX, ControlCommand, RELOAD_CONFIG_LINE, TradingEngine, parse_stdin_line};
use events::EngineEvent;
use executor::{Executor, LiveExecutor, PaperExecutor};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

/// The main entry point for the Tradelane trading engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; secrets may come from the real environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    let _log_guard = init_logging(&config.logging).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Run(args) => handle_run(config, cli.config, args).await,
        Commands::Account => handle_account(config).await,
        Commands::Check => handle_check(config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// An unattended trend-following engine for leveraged crypto derivatives.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop.
    Run(RunArgs),
    /// Print the account balance and open positions.
    Account,
    /// Run the startup connectivity checks and exit.
    Check,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Simulate fills locally instead of sending orders.
    #[arg(long)]
    dry_run: bool,

    /// Manage existing positions only until `__START_TRADING__` arrives on stdin.
    #[arg(long)]
    info_only: bool,

    /// Override the configured trading direction.
    #[arg(long, value_enum)]
    direction: Option<TradingDirection>,

    /// Override the configured trading mode.
    #[arg(long, value_enum)]
    mode: Option<TradingMode>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if self.dry_run {
            config.trading.dry_run = true;
        }
        if let Some(direction) = self.direction {
            config.trading.direction = direction;
        }
        if let Some(mode) = self.mode {
            config.trading.mode = mode;
        }
    }
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_run(mut config: Config, config_path: String, args: RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration after command-line overrides")?;

    let (events, _) = broadcast::channel(config.engine.event_buffer);
    if let Some(alerter) = TelegramAlerter::new(&config.telegram) {
        tokio::spawn(run_alerter_service(alerter, events.subscribe()));
    }
    tokio::spawn(print_account_snapshots(events.subscribe()));

    let (tx, rx) = mpsc::channel(32);
    spawn_stdin_reader(tx.clone(), config_path, args.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ControlCommand::Shutdown).await;
        }
    });

    let mut engine = build_engine(config, events)?;
    engine.bootstrap().await.context("Startup checks failed")?;

    tracing::info!(info_only = args.info_only, "--- Engine is running. ---");
    engine.run(rx, !args.info_only).await;
    tracing::info!("Engine stopped.");
    Ok(())
}

async fn handle_account(config: Config) -> anyhow::Result<()> {
    let (events, _) = broadcast::channel(config.engine.event_buffer);
    let engine = build_engine(config, events)?;
    let snapshot = engine.account_snapshot().await.context("Failed to fetch the account snapshot")?;

    println!("Available balance: {} {}", snapshot.balance, engine.config().trading.quote_asset);
    if snapshot.positions.is_empty() {
        println!("No open positions.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Symbol", "Side", "Size", "Entry", "Unrealized PnL"]);
    let mut total_pnl = Decimal::ZERO;
    for p in &snapshot.positions {
        total_pnl += p.unrealized_pnl;
        table.add_row(vec![
            p.symbol.clone(),
            p.side.to_string(),
            p.size.to_string(),
            p.entry_price.to_string(),
            p.unrealized_pnl.round_dp(2).to_string(),
        ]);
    }
    println!("{table}");
    println!("Total unrealized PnL: {}", total_pnl.round_dp(2));
    Ok(())
}

async fn handle_check(config: Config) -> anyhow::Result<()> {
    let (events, _) = broadcast::channel(config.engine.event_buffer);
    let mut engine = build_engine(config, events)?;
    engine.bootstrap().await.context("Startup checks failed")?;
    println!("All startup checks passed.");
    Ok(())
}

// ==============================================================================
// Wiring
// ==============================================================================

fn build_engine(config: Config, events: broadcast::Sender<EngineEvent>) -> anyhow::Result<TradingEngine> {
    let keys = config.api.keys(config.trading.testnet);
    let api_client: Arc<dyn ApiClient> = Arc::new(
        BinanceClient::new(config.trading.mode, config.trading.testnet, keys)
            .context("Failed to create the exchange client")?,
    );

    let executor: Arc<dyn Executor> = if config.trading.dry_run {
        tracing::warn!("DRY RUN: orders are simulated locally.");
        Arc::new(PaperExecutor::new())
    } else {
        Arc::new(LiveExecutor::new(
            Arc::clone(&api_client),
            RetryPolicy::from_engine(&config.engine),
        ))
    };

    Ok(TradingEngine::new(config, api_client, executor, events)?)
}

/// Translates stdin lines into control commands until stdin closes.
fn spawn_stdin_reader(tx: mpsc::Sender<ControlCommand>, config_path: String, overrides: RunArgs) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = if line.trim() == RELOAD_CONFIG_LINE {
                match load_config_from(&config_path) {
                    Ok(mut config) => {
                        overrides.apply(&mut config);
                        Some(ControlCommand::Reload(Box::new(config)))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reload failed; keeping the current configuration");
                        None
                    }
                }
            } else {
                parse_stdin_line(&line)
            };
            if let Some(command) = command {
                if tx.send(command).await.is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Stdin closed; control lines no longer read.");
    });
}

/// Prints every account snapshot for the control panel.
async fn print_account_snapshots(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(EngineEvent::AccountSnapshot(snapshot)) => match snapshot.to_json() {
                Ok(json) => println!("{ACCOUNT_INFO_PREFIX}{json}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialise the account snapshot"),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Snapshot printer lagged, skipped {} events.", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
