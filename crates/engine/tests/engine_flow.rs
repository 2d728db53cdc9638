use api_client::error::ApiError;
use api_client::{ApiClient, BalanceResponse, OrderResponse};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use configuration::{Config, TradingMode};
use core_types::{
    ExchangePosition, Kline, OrderRequest, OrderSide, Side, SignalTier, StrategyKind, SymbolFilters,
};
use engine::error::EngineError;
use engine::{ControlCommand, TradingEngine};
use events::EngineEvent;
use executor::{EntryPlan, Executor, LifecycleContext, PaperExecutor, PositionLifecycle};
use risk::PrecisionAdapter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

/// An in-memory exchange. Every kline request returns `klines`.
#[derive(Default)]
struct MockExchange {
    balance_fails: bool,
    no_filters: bool,
    klines: Vec<Kline>,
    positions: Mutex<Vec<ExchangePosition>>,
    orders: Mutex<Vec<OrderRequest>>,
    leverage: Mutex<Vec<String>>,
}

#[async_trait]
impl ApiClient for MockExchange {
    async fn fetch_klines(&self, _: &str, _: &str, limit: u16) -> Result<Vec<Kline>, ApiError> {
        let skip = self.klines.len().saturating_sub(limit as usize);
        Ok(self.klines[skip..].to_vec())
    }
    async fn get_ticker_price(&self, _: &str) -> Result<Decimal, ApiError> {
        Ok(dec!(100))
    }
    async fn set_leverage(&self, symbol: &str, _: u8) -> Result<(), ApiError> {
        self.leverage.lock().unwrap().push(symbol.to_string());
        Ok(())
    }
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        self.orders.lock().unwrap().push(order.clone());
        Err(ApiError::Exchange { code: -2019, msg: "Margin is insufficient.".into() })
    }
    async fn cancel_order(&self, _: &str, _: &str) -> Result<(), ApiError> {
        Ok(())
    }
    async fn get_account_balance(&self) -> Result<Vec<BalanceResponse>, ApiError> {
        if self.balance_fails {
            return Err(ApiError::Exchange { code: -2015, msg: "Invalid API-key, IP, or permissions".into() });
        }
        Ok(vec![BalanceResponse {
            asset: "USDT".to_string(),
            balance: dec!(1000),
            available_balance: dec!(1000),
        }])
    }
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError> {
        Ok(self.positions.lock().unwrap().clone())
    }
    async fn get_exchange_filters(&self) -> Result<HashMap<String, SymbolFilters>, ApiError> {
        if self.no_filters {
            return Ok(HashMap::new());
        }
        Ok(HashMap::from([(
            "BTCUSDT".to_string(),
            SymbolFilters {
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
                min_notional: dec!(5),
                tick_size: dec!(0.1),
            },
        )]))
    }
}

/// `n` flat bars around 100, with the last close at `last_close`.
fn bars(n: usize, last_close: Decimal) -> Vec<Kline> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = if i + 1 == n { last_close } else { dec!(100) };
            Kline {
                open_time: start + Duration::hours(i as i64),
                open: dec!(100),
                high: close.max(dec!(101)),
                low: close.min(dec!(99)),
                close,
                volume: dec!(1000),
                close_time: start + Duration::hours(i as i64 + 1),
                interval: "1h".to_string(),
            }
        })
        .collect()
}

/// Quiet bars around 100, then a close at 103 through the range on five times the volume.
fn breakout_bars(n: usize) -> Vec<Kline> {
    let mut klines = bars(n - 1, dec!(100));
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    klines.push(Kline {
        open_time: start + Duration::hours(n as i64 - 1),
        open: dec!(100),
        high: dec!(103.5),
        low: dec!(100),
        close: dec!(103),
        volume: dec!(5000),
        close_time: start + Duration::hours(n as i64),
        interval: "1h".to_string(),
    });
    klines
}

/// Dry-run config that trades the breakout fixture: no market filter and
/// hard stops on, so the entry rests a stop in the paper book.
fn entry_config(symbols: &[&str]) -> Config {
    let mut config = test_config(true);
    config.market_filter.enabled = false;
    config.trading.hard_stop_orders = true;
    config.trading.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config
}

async fn entries(paper: &PaperExecutor) -> Vec<OrderRequest> {
    paper
        .submitted()
        .await
        .into_iter()
        .filter(|o| o.trigger_price.is_none() && !o.reduce_only)
        .collect()
}

fn test_config(dry_run: bool) -> Config {
    let mut config = Config::default();
    config.trading.dry_run = dry_run;
    config.trading.hard_stop_orders = false;
    config.engine.max_retries = 1;
    config.engine.retry_delay_secs = 0;
    config
}

fn engine_with(
    config: Config,
    exchange: Arc<MockExchange>,
    paper: Arc<PaperExecutor>,
) -> (TradingEngine, broadcast::Receiver<EngineEvent>) {
    let (events, rx) = broadcast::channel(64);
    let engine = TradingEngine::new(config, exchange, paper, events).unwrap();
    (engine, rx)
}

/// Opens a long at 100 with the stop at 90 and registers it with the engine.
async fn open_long(engine: &TradingEngine, paper: Arc<PaperExecutor>, symbol: &str) {
    let (events, _) = broadcast::channel(16);
    let executor: Arc<dyn Executor> = paper;
    let ctx = LifecycleContext {
        executor,
        precision: Arc::new(PrecisionAdapter::new(TradingMode::Futures)),
        events,
        exit: engine.config().exit.clone(),
        hard_stop_orders: false,
    };
    let plan = EntryPlan {
        symbol: symbol.to_string(),
        side: Side::Long,
        tier: SignalTier::B,
        strategy: StrategyKind::VolumeBreakout,
        quantity: dec!(0.5),
        reference_price: dec!(100),
        stop_price: dec!(90),
        opened_at: Utc::now(),
    };
    let lifecycle = PositionLifecycle::enter(plan, ctx).await.unwrap();
    engine.registry().lock().await.insert(lifecycle).unwrap();
}

#[tokio::test]
async fn test_bootstrap_names_the_failed_check() {
    let exchange = Arc::new(MockExchange { balance_fails: true, ..Default::default() });
    let (mut engine, _) = engine_with(test_config(false), exchange, Arc::new(PaperExecutor::new()));
    match engine.bootstrap().await {
        Err(EngineError::Startup { check, .. }) => assert_eq!(check, "account balance"),
        other => panic!("expected a startup failure, got {other:?}"),
    }

    let exchange = Arc::new(MockExchange { no_filters: true, ..Default::default() });
    let (mut engine, _) = engine_with(test_config(false), exchange, Arc::new(PaperExecutor::new()));
    match engine.bootstrap().await {
        Err(EngineError::Startup { check, .. }) => assert_eq!(check, "exchange metadata"),
        other => panic!("expected a startup failure, got {other:?}"),
    }

    let exchange = Arc::new(MockExchange::default());
    let (mut engine, _) = engine_with(test_config(false), exchange, Arc::new(PaperExecutor::new()));
    match engine.bootstrap().await {
        Err(EngineError::Startup { check, .. }) => assert_eq!(check, "market data"),
        other => panic!("expected a startup failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bootstrap_sets_leverage_on_every_symbol() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(100)), ..Default::default() });
    let (mut engine, _) = engine_with(test_config(false), Arc::clone(&exchange), Arc::new(PaperExecutor::new()));
    engine.bootstrap().await.unwrap();
    assert_eq!(exchange.leverage.lock().unwrap().len(), engine.config().trading.symbols.len());
    assert!(exchange.orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_skips_leverage() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(100)), ..Default::default() });
    let (mut engine, _) = engine_with(test_config(true), Arc::clone(&exchange), Arc::new(PaperExecutor::new()));
    engine.bootstrap().await.unwrap();
    assert!(exchange.leverage.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_flat_closes_without_an_order() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(100)), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (engine, _) = engine_with(test_config(false), Arc::clone(&exchange), Arc::clone(&paper));
    open_long(&engine, Arc::clone(&paper), "BTC/USDT").await;
    assert_eq!(paper.submitted().await.len(), 1);

    engine.monitor_positions().await;
    assert!(engine.registry().lock().await.is_empty());

    engine.monitor_positions().await;
    assert_eq!(paper.submitted().await.len(), 1);
    assert!(exchange.orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_position_reported_by_exchange_stays_open() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(100)), ..Default::default() });
    exchange.positions.lock().unwrap().push(ExchangePosition {
        symbol: "BTCUSDT".to_string(),
        signed_size: dec!(0.5),
        entry_price: dec!(100),
        unrealized_pnl: Decimal::ZERO,
    });
    let paper = Arc::new(PaperExecutor::new());
    let (engine, _) = engine_with(test_config(false), exchange, Arc::clone(&paper));
    open_long(&engine, Arc::clone(&paper), "BTC/USDT").await;

    engine.monitor_positions().await;
    let registry = engine.registry();
    let registry = registry.lock().await;
    assert!(registry.contains("BTC/USDT"));
}

#[tokio::test]
async fn test_monitor_advances_the_one_r_stage() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(110)), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (engine, _) = engine_with(test_config(true), exchange, Arc::clone(&paper));
    open_long(&engine, Arc::clone(&paper), "BTC/USDT").await;

    engine.monitor_positions().await;
    let registry = engine.registry();
    let mut registry = registry.lock().await;
    let position = registry.get_mut("BTC/USDT").unwrap().position().clone();
    assert!(position.flags.one_r);
    assert_eq!(position.current_stop, dec!(103));
    assert_eq!(position.remaining_size, dec!(0.5));
}

#[tokio::test]
async fn test_close_all_flattens_every_position() {
    let exchange = Arc::new(MockExchange { klines: bars(60, dec!(100)), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (engine, _) = engine_with(test_config(true), exchange, Arc::clone(&paper));
    open_long(&engine, Arc::clone(&paper), "BTC/USDT").await;
    open_long(&engine, Arc::clone(&paper), "ETH/USDT").await;

    assert_eq!(engine.close_all().await, 2);
    assert!(engine.registry().lock().await.is_empty());
    assert_eq!(engine.close_all().await, 0);

    let exits: Vec<_> = paper.submitted().await.into_iter().filter(|o| o.reduce_only).collect();
    assert_eq!(exits.len(), 2);
    assert!(exits.iter().all(|o| o.quantity == dec!(0.5)));
}

#[tokio::test]
async fn test_short_history_is_not_tradable() {
    let exchange = Arc::new(MockExchange { klines: bars(20, dec!(100)), ..Default::default() });
    let (engine, _) = engine_with(test_config(true), Arc::clone(&exchange), Arc::new(PaperExecutor::new()));
    assert!(engine.evaluate_symbol("BTC/USDT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_scan_without_setups_places_no_orders() {
    let exchange = Arc::new(MockExchange { klines: bars(120, dec!(100)), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (mut engine, _) = engine_with(test_config(true), exchange, Arc::clone(&paper));
    engine.run_cycle().await;
    assert!(paper.submitted().await.is_empty());
    assert!(engine.registry().lock().await.is_empty());
}

#[tokio::test]
async fn test_refresh_publishes_a_snapshot() {
    let exchange = Arc::new(MockExchange::default());
    let paper = Arc::new(PaperExecutor::new());
    let (mut engine, mut events) = engine_with(test_config(true), exchange, Arc::clone(&paper));
    open_long(&engine, Arc::clone(&paper), "SOL/USDT").await;

    let (tx, rx) = mpsc::channel(8);
    tx.send(ControlCommand::Refresh).await.unwrap();
    tx.send(ControlCommand::Shutdown).await.unwrap();
    engine.run(rx, false).await;

    let snapshot = loop {
        match events.try_recv().unwrap() {
            EngineEvent::AccountSnapshot(snapshot) => break snapshot,
            _ => continue,
        }
    };
    assert_eq!(snapshot.balance, dec!(1000));
    assert_eq!(snapshot.positions.len(), 1);
    assert_eq!(snapshot.positions[0].symbol, "SOL/USDT");
    assert_eq!(snapshot.positions[0].size, dec!(0.5));
}

#[tokio::test]
async fn test_start_enables_trading_from_info_only() {
    let exchange = Arc::new(MockExchange::default());
    let (mut engine, _) = engine_with(test_config(true), exchange, Arc::new(PaperExecutor::new()));

    let (tx, rx) = mpsc::channel(8);
    tx.send(ControlCommand::Start).await.unwrap();
    drop(tx);
    engine.run(rx, false).await;
    assert!(engine.is_trading_enabled());
}

#[tokio::test]
async fn test_scan_opens_a_protected_position_once() {
    let exchange = Arc::new(MockExchange { klines: breakout_bars(250), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (mut engine, mut events) = engine_with(entry_config(&["BTC/USDT"]), exchange, Arc::clone(&paper));

    engine.run_cycle().await;

    let opened = entries(&paper).await;
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].symbol, "BTC/USDT");
    assert_eq!(opened[0].side, OrderSide::Buy);

    let position = {
        let registry = engine.registry();
        let mut registry = registry.lock().await;
        assert_eq!(registry.len(), 1);
        registry.get_mut("BTC/USDT").unwrap().position().clone()
    };
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.strategy, StrategyKind::VolumeBreakout);
    assert_eq!(position.entry_price, dec!(103));
    assert!(position.initial_stop < dec!(99));
    assert_eq!(position.remaining_size, opened[0].quantity);

    let resting = paper.resting_stops().await;
    assert_eq!(resting.len(), 1);
    assert_eq!(resting[0].1.trigger_price, Some(position.current_stop));
    assert_eq!(resting[0].1.quantity, position.remaining_size);
    assert!(resting[0].1.reduce_only);

    let mut signalled = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::SignalFound(signal) = event {
            assert_eq!(signal.symbol, "BTC/USDT");
            signalled = true;
        }
    }
    assert!(signalled);

    // The symbol is held, so the next scan leaves it alone.
    engine.run_cycle().await;
    assert_eq!(entries(&paper).await.len(), 1);
    assert_eq!(engine.registry().lock().await.len(), 1);
    assert_eq!(paper.resting_stops().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_risk_budget_ends_the_scan() {
    let mut config = entry_config(&["BTC/USDT", "ETH/USDT"]);
    // One full-size entry already uses more than this ceiling.
    config.risk.max_total_risk = dec!(0.005);
    let exchange = Arc::new(MockExchange { klines: breakout_bars(250), ..Default::default() });
    let paper = Arc::new(PaperExecutor::new());
    let (mut engine, _) = engine_with(config, exchange, Arc::clone(&paper));

    engine.run_cycle().await;

    let opened = entries(&paper).await;
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].symbol, "BTC/USDT");
    let registry = engine.registry();
    let registry = registry.lock().await;
    assert!(registry.contains("BTC/USDT"));
    assert!(!registry.contains("ETH/USDT"));
}
