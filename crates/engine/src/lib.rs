//! # Tradelane Engine
//!
//! The polling orchestrator. Each cycle resolves the symbol universe, scans
//! it for entries while the aggregate risk budget allows, then reconciles and
//! monitors every open position. Cycles never overlap; control commands are
//! serviced between them.

use crate::error::EngineError;
use api_client::{ApiClient, RetryPolicy, with_retry};
use chrono::Utc;
use configuration::{Config, TradingMode};
use core_types::{CloseReason, Kline, Side};
use events::{AccountSnapshot, EngineEvent, LogLevel, PositionSummary, SignalFound};
use executor::{EntryPlan, Executor, LifecycleContext, MarketTick, PositionLifecycle, PositionRegistry};
use indicators::{IndicatorFrame, Series};
use risk::{FixedFractionalRiskManager, PrecisionAdapter, RiskManager};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, broadcast, mpsc};

pub mod control;
pub mod error;
pub mod pipeline;
pub mod reconciler;
pub mod universe;

pub use control::{ACCOUNT_INFO_PREFIX, ControlCommand, RELOAD_CONFIG_LINE, parse_stdin_line};
pub use pipeline::{ApprovedSignal, SignalPipeline};
pub use reconciler::StateReconciler;
pub use universe::resolve_universe;

/// Candles fetched per timeframe by the startup market-data check.
const STARTUP_PROBE_LIMIT: u16 = 50;

/// What the run loop does after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// End the current sleep and start a cycle now.
    Wake,
    Exit,
}

/// The central orchestrator for live (and dry-run) trading.
pub struct TradingEngine {
    // --- Configuration ---
    config: Arc<Config>,
    /// Applied at the next cycle boundary.
    pending_config: Option<Config>,

    // --- Shared, Thread-Safe Components ---
    api_client: Arc<dyn ApiClient>,
    executor: Arc<dyn Executor>,
    precision: Arc<PrecisionAdapter>,
    risk_manager: Arc<dyn RiskManager>,
    registry: Arc<Mutex<PositionRegistry>>,
    events: broadcast::Sender<EngineEvent>,

    // --- Per-snapshot components ---
    pipeline: SignalPipeline,
    reconciler: StateReconciler,
    retry: RetryPolicy,

    trading_enabled: bool,
}

impl TradingEngine {
    /// Creates a new engine. Venue filters are loaded later by [`Self::bootstrap`];
    /// until then precision falls back to the built-in table.
    pub fn new(
        config: Config,
        api_client: Arc<dyn ApiClient>,
        executor: Arc<dyn Executor>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let precision = Arc::new(PrecisionAdapter::new(config.trading.mode));
        let risk_manager: Arc<dyn RiskManager> =
            Arc::new(FixedFractionalRiskManager::new(&config, Arc::clone(&precision))?);
        let pipeline = SignalPipeline::new(&config)?;
        let retry = RetryPolicy::from_engine(&config.engine);
        let reconciler = StateReconciler::new(Arc::clone(&api_client), retry, reconciles(&config));

        Ok(Self {
            config: Arc::new(config),
            pending_config: None,
            api_client,
            executor,
            precision,
            risk_manager,
            registry: Arc::new(Mutex::new(PositionRegistry::new())),
            events,
            pipeline,
            reconciler,
            retry,
            trading_enabled: true,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Arc<Mutex<PositionRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn is_trading_enabled(&self) -> bool {
        self.trading_enabled
    }

    /// Startup connectivity checks. Any failure aborts startup and names the check.
    ///
    /// 1. Account balance (credentials).
    /// 2. Venue metadata, which replaces the built-in precision table.
    /// 3. Candles on every timeframe for the first configured symbol.
    /// 4. Leverage on every configured symbol (futures, not dry-run).
    pub async fn bootstrap(&mut self) -> Result<(), EngineError> {
        tracing::info!(
            mode = ?self.config.trading.mode,
            dry_run = self.config.trading.dry_run,
            testnet = self.config.trading.testnet,
            "Running startup checks..."
        );

        let quote = &self.config.trading.quote_asset;
        let balance = self
            .api_client
            .available_balance(quote)
            .await
            .map_err(startup("account balance"))?;
        tracing::info!(%balance, asset = %quote, "Account balance check passed.");

        let filters = self
            .api_client
            .get_exchange_filters()
            .await
            .map_err(startup("exchange metadata"))?;
        if filters.is_empty() {
            return Err(EngineError::Startup {
                check: "exchange metadata",
                reason: "the venue returned no symbol filters".to_string(),
            });
        }
        self.install_filters(filters)?;

        let probe = self.config.trading.symbols.first().cloned().ok_or_else(|| EngineError::Startup {
            check: "market data",
            reason: "no symbols configured".to_string(),
        })?;
        let tf = &self.config.timeframes;
        let mut intervals = vec![tf.trend.clone(), tf.signal.clone()];
        if self.pipeline.wants_mtf() {
            intervals.push(tf.mtf.clone());
        }
        for interval in intervals {
            let klines = self
                .api_client
                .fetch_klines(&probe, &interval, STARTUP_PROBE_LIMIT)
                .await
                .map_err(startup("market data"))?;
            if klines.is_empty() {
                return Err(EngineError::Startup {
                    check: "market data",
                    reason: format!("no {interval} candles for {probe}"),
                });
            }
        }
        tracing::info!(symbol = %probe, "Market data check passed.");

        if self.config.trading.mode == TradingMode::Futures && !self.config.trading.dry_run {
            let leverage = self.config.trading.leverage;
            for symbol in &self.config.trading.symbols {
                self.api_client
                    .set_leverage(symbol, leverage)
                    .await
                    .map_err(startup("leverage"))?;
            }
            tracing::info!(leverage, "Leverage set on {} symbols.", self.config.trading.symbols.len());
        }

        tracing::info!("Startup checks complete.");
        Ok(())
    }

    fn install_filters(&mut self, filters: HashMap<String, core_types::SymbolFilters>) -> Result<(), EngineError> {
        let precision = Arc::new(PrecisionAdapter::with_filters(self.config.trading.mode, filters));
        self.risk_manager = Arc::new(FixedFractionalRiskManager::new(&self.config, Arc::clone(&precision))?);
        tracing::info!(symbols = precision.loaded_symbols(), "Venue precision rules loaded.");
        self.precision = precision;
        Ok(())
    }

    /// The main loop. Returns on `Shutdown` or when every command sender is gone.
    ///
    /// With `start_enabled` false the engine only manages existing positions
    /// until a `Start` command arrives.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ControlCommand>, start_enabled: bool) {
        self.trading_enabled = start_enabled;
        if !start_enabled {
            tracing::info!("Info-only mode: waiting for a start command before scanning.");
        }
        let poll = Duration::from_secs(self.config.engine.poll_interval_secs);

        loop {
            // Cycle boundary: queued commands first, then any reload.
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if self.handle_command(command).await == Flow::Exit {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::info!("Command channel closed. Engine stopping.");
                        return;
                    }
                }
            }
            if let Some(next) = self.pending_config.take() {
                self.apply_config(next);
            }

            self.run_cycle().await;

            let sleep = tokio::time::sleep(poll);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    command = commands.recv() => match command {
                        Some(command) => match self.handle_command(command).await {
                            Flow::Continue => {}
                            Flow::Wake => break,
                            Flow::Exit => return,
                        },
                        None => {
                            tracing::info!("Command channel closed. Engine stopping.");
                            return;
                        }
                    },
                }
            }
        }
    }

    async fn handle_command(&mut self, command: ControlCommand) -> Flow {
        tracing::debug!(?command, "Control command received");
        match command {
            ControlCommand::Start => {
                if !self.trading_enabled {
                    tracing::info!("Trading started.");
                    self.emit(EngineEvent::log(LogLevel::Info, "Trading started"));
                }
                self.trading_enabled = true;
                Flow::Wake
            }
            ControlCommand::Stop => {
                if self.trading_enabled {
                    tracing::info!("Trading stopped; open positions remain managed.");
                    self.emit(EngineEvent::log(LogLevel::Warn, "Trading stopped, positions still managed"));
                }
                self.trading_enabled = false;
                Flow::Continue
            }
            ControlCommand::CloseAll => {
                let closed = self.close_all().await;
                tracing::info!(closed, "Close-all command serviced.");
                Flow::Continue
            }
            ControlCommand::Refresh => {
                self.publish_snapshot().await;
                Flow::Continue
            }
            ControlCommand::Reload(config) => {
                self.pending_config = Some(*config);
                Flow::Continue
            }
            ControlCommand::Shutdown => {
                tracing::info!("Shutdown requested.");
                Flow::Exit
            }
        }
    }

    /// Swaps in a new configuration snapshot. Positions already open keep the
    /// exit settings they were entered with.
    fn apply_config(&mut self, next: Config) {
        let current = &self.config.trading;
        if next.trading.mode != current.mode || next.trading.dry_run != current.dry_run {
            tracing::warn!("Reload changes the trading mode or dry-run flag; restart required. Reload ignored.");
            return;
        }

        let rebuilt = SignalPipeline::new(&next).map_err(EngineError::from).and_then(|pipeline| {
            let risk = FixedFractionalRiskManager::new(&next, Arc::clone(&self.precision))?;
            Ok((pipeline, risk))
        });
        match rebuilt {
            Ok((pipeline, risk)) => {
                self.pipeline = pipeline;
                self.risk_manager = Arc::new(risk);
                self.retry = RetryPolicy::from_engine(&next.engine);
                self.reconciler = StateReconciler::new(Arc::clone(&self.api_client), self.retry, reconciles(&next));
                self.config = Arc::new(next);
                tracing::info!("Configuration reloaded.");
            }
            Err(e) => tracing::warn!(error = %e, "Reloaded configuration rejected; keeping the current one."),
        }
    }

    /// One full cycle: the entry scan (when trading is enabled), then position management.
    pub async fn run_cycle(&mut self) {
        if self.trading_enabled {
            self.scan().await;
        } else {
            tracing::debug!("Trading paused; skipping the entry scan.");
        }
        self.monitor_positions().await;
    }

    async fn scan(&self) {
        let quote = &self.config.trading.quote_asset;
        let balance = match with_retry(&self.retry, "available_balance", || {
            self.api_client.available_balance(quote)
        })
        .await
        {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(error = %e, "Balance unavailable; skipping the entry scan this cycle.");
                return;
            }
        };

        let universe = resolve_universe(&self.config).await;
        tracing::info!(symbols = universe.len(), %balance, "Scanning for entries...");

        for symbol in universe {
            {
                let registry = self.registry.lock().await;
                if registry.contains(&symbol) {
                    continue;
                }
                if !self.risk_manager.check_aggregate_risk(&registry.exposures(), balance) {
                    tracing::info!("Aggregate risk budget exhausted; ending the scan.");
                    break;
                }
            }

            match self.evaluate_symbol(&symbol).await {
                Ok(Some(approved)) => {
                    if let Err(e) = self.open_position(approved, balance).await {
                        tracing::error!(symbol = %symbol, error = %e, "Failed to open position");
                        self.emit(EngineEvent::log(LogLevel::Error, format!("Entry failed for {symbol}: {e}")));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Symbol skipped this cycle"),
            }
        }
    }

    /// Fetches and evaluates one symbol. `Ok(None)` covers short history and no setup.
    pub async fn evaluate_symbol(&self, symbol: &str) -> Result<Option<ApprovedSignal>, EngineError> {
        let tf = &self.config.timeframes;

        let trend_klines = self.fetch(symbol, &tf.trend, tf.trend_limit).await?;
        if trend_klines.len() < tf.min_trend_bars {
            tracing::debug!(symbol, bars = trend_klines.len(), "Not enough trend history");
            return Ok(None);
        }
        let signal_klines = self.fetch(symbol, &tf.signal, tf.signal_limit).await?;
        if signal_klines.len() < tf.min_signal_bars {
            tracing::debug!(symbol, bars = signal_klines.len(), "Not enough signal history");
            return Ok(None);
        }

        let indicators = &self.config.indicators;
        let mtf = if self.pipeline.wants_mtf() {
            match self.fetch(symbol, &tf.mtf, tf.mtf_limit).await {
                Ok(klines) => Some(IndicatorFrame::compute(klines, indicators)?),
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "MTF candles unavailable; tiering without them");
                    None
                }
            }
        } else {
            None
        };
        let trend = IndicatorFrame::compute(trend_klines, indicators)?;
        let signal = IndicatorFrame::compute(signal_klines, indicators)?;

        Ok(self.pipeline.evaluate(symbol, &trend, &signal, mtf.as_ref())?)
    }

    async fn open_position(&self, approved: ApprovedSignal, balance: Decimal) -> Result<(), EngineError> {
        let candidate = &approved.candidate;
        let symbol = &candidate.symbol;

        let raw_stop = self.risk_manager.calculate_stop_loss(
            candidate.stop_reference,
            candidate.atr,
            candidate.side,
            approved.atr_multiplier,
        );
        let stop = self.precision.round_price(symbol, raw_stop);
        if candidate.side.favorable_move(stop, candidate.entry_price) <= Decimal::ZERO {
            tracing::info!(%symbol, %stop, entry = %candidate.entry_price, "Stop not below risk side of entry; candidate dropped");
            return Ok(());
        }

        tracing::info!(
            %symbol,
            side = %candidate.side,
            strategy = %candidate.strategy,
            tier = %approved.tier.tier,
            entry = %candidate.entry_price,
            %stop,
            "Signal approved"
        );
        self.emit(EngineEvent::SignalFound(SignalFound {
            timestamp: Utc::now(),
            symbol: symbol.clone(),
            side: candidate.side,
            strategy: candidate.strategy,
            strength: candidate.strength,
            tier: approved.tier.tier,
            entry_price: candidate.entry_price,
            volume_ratio: candidate.volume_ratio,
            mtf_aligned: approved.mtf_aligned,
            market_reason: approved.market_reason.clone(),
        }));

        let size = match self.risk_manager.size_position(
            symbol,
            balance,
            candidate.entry_price,
            stop,
            approved.tier.multiplier,
        ) {
            Ok(size) => size,
            Err(e) => {
                tracing::info!(%symbol, reason = %e, "Candidate dropped by sizing");
                return Ok(());
            }
        };

        let plan = EntryPlan {
            symbol: symbol.clone(),
            side: candidate.side,
            tier: approved.tier.tier,
            strategy: candidate.strategy,
            quantity: size.quantity,
            reference_price: candidate.entry_price,
            stop_price: stop,
            opened_at: Utc::now(),
        };
        let lifecycle = PositionLifecycle::enter(plan, self.lifecycle_context()).await?;
        self.registry.lock().await.insert(lifecycle)?;
        Ok(())
    }

    fn lifecycle_context(&self) -> LifecycleContext {
        LifecycleContext {
            executor: Arc::clone(&self.executor),
            precision: Arc::clone(&self.precision),
            events: self.events.clone(),
            exit: self.config.exit.clone(),
            hard_stop_orders: self.config.trading.hard_stop_orders,
        }
    }

    /// Reconciles against the exchange, then runs one monitor pass on every
    /// active position. A failure on one position never stops the others.
    pub async fn monitor_positions(&self) {
        let mut registry = self.registry.lock().await;
        if registry.is_empty() {
            return;
        }

        if let Err(e) = self.reconciler.run(&mut registry).await {
            tracing::warn!(error = %e, "Reconciliation failed; monitoring against local state");
        }

        for id in registry.ids() {
            let Some(lifecycle) = registry.get_mut(&id) else { continue };
            if !lifecycle.is_active() {
                continue;
            }
            let symbol = lifecycle.symbol().to_string();
            let tick = match self.market_tick(&symbol).await {
                Ok(Some(tick)) => tick,
                Ok(None) => {
                    tracing::warn!(%symbol, "No candles for monitoring; skipped this cycle");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "Market data unavailable; position skipped this cycle");
                    continue;
                }
            };
            if let Err(e) = lifecycle.monitor(&tick).await {
                tracing::error!(%symbol, error = %e, "Monitor pass failed");
                self.emit(EngineEvent::log(LogLevel::Error, format!("Monitoring {symbol} failed: {e}")));
            }
        }

        for closed in registry.prune_closed() {
            tracing::info!(symbol = %closed.symbol, reason = ?closed.close_reason, "Position removed from registry");
        }
    }

    async fn market_tick(&self, symbol: &str) -> Result<Option<MarketTick>, EngineError> {
        let tf = &self.config.timeframes;
        let klines = self.fetch(symbol, &tf.signal, tf.monitor_limit).await?;
        let frame = IndicatorFrame::compute(klines, &self.config.indicators)?;
        let atr = frame.latest(Series::Atr);
        Ok(MarketTick::from_klines(frame.klines(), atr, self.config.exit.swing_window, Utc::now()))
    }

    /// Closes every active position at market. Safe to call at any time:
    /// closing an already-closed position is a no-op.
    pub async fn close_all(&self) -> usize {
        let mut registry = self.registry.lock().await;
        let mut closed = 0;
        for lifecycle in registry.iter_mut() {
            if !lifecycle.is_active() {
                continue;
            }
            let symbol = lifecycle.symbol().to_string();
            let price = match with_retry(&self.retry, "get_ticker_price", || {
                self.api_client.get_ticker_price(&symbol)
            })
            .await
            {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "Ticker unavailable; using entry price as reference");
                    lifecycle.position().entry_price
                }
            };
            match lifecycle.close(CloseReason::Manual, price).await {
                Ok(()) => closed += 1,
                Err(e) => {
                    tracing::error!(%symbol, error = %e, "Manual close failed");
                    self.emit(EngineEvent::log(LogLevel::Error, format!("Manual close of {symbol} failed: {e}")));
                }
            }
        }
        registry.prune_closed();
        closed
    }

    /// Balance plus open positions. Futures accounts report positions from the
    /// exchange; spot and dry-run report the registry.
    pub async fn account_snapshot(&self) -> Result<AccountSnapshot, EngineError> {
        let quote = &self.config.trading.quote_asset;
        let balance = with_retry(&self.retry, "available_balance", || {
            self.api_client.available_balance(quote)
        })
        .await?;

        let positions = if self.reconciler.is_enabled() {
            with_retry(&self.retry, "get_open_positions", || self.api_client.get_open_positions())
                .await?
                .into_iter()
                .filter(|p| !p.is_flat())
                .map(|p| PositionSummary {
                    side: if p.signed_size > Decimal::ZERO { Side::Long } else { Side::Short },
                    size: p.signed_size.abs(),
                    symbol: p.symbol,
                    entry_price: p.entry_price,
                    unrealized_pnl: p.unrealized_pnl,
                })
                .collect()
        } else {
            let registry = self.registry.lock().await;
            registry
                .iter()
                .filter(|lc| lc.is_active())
                .map(|lc| {
                    let p = lc.position();
                    PositionSummary {
                        symbol: p.symbol.clone(),
                        side: p.side,
                        size: p.remaining_size,
                        entry_price: p.entry_price,
                        unrealized_pnl: Decimal::ZERO,
                    }
                })
                .collect()
        };

        Ok(AccountSnapshot { timestamp: Utc::now(), balance, positions })
    }

    async fn publish_snapshot(&self) {
        match self.account_snapshot().await {
            Ok(snapshot) => self.emit(EngineEvent::AccountSnapshot(snapshot)),
            Err(e) => tracing::warn!(error = %e, "Account snapshot unavailable"),
        }
    }

    async fn fetch(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<Kline>, EngineError> {
        Ok(with_retry(&self.retry, "fetch_klines", || {
            self.api_client.fetch_klines(symbol, interval, limit)
        })
        .await?)
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Reconciliation needs an exchange-side position record.
fn reconciles(config: &Config) -> bool {
    !config.trading.dry_run && config.trading.mode == TradingMode::Futures
}

fn startup(check: &'static str) -> impl FnOnce(api_client::error::ApiError) -> EngineError {
    move |e| EngineError::Startup { check, reason: e.to_string() }
}
