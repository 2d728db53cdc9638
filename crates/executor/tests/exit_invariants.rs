//! Property tests for the exit protocol over random price paths.

use chrono::{Duration, TimeZone, Utc};
use configuration::{ExitConfig, TradingMode};
use core_types::{Side, SignalTier, StrategyKind};
use executor::{EntryPlan, LifecycleContext, MarketTick, PaperExecutor, PositionLifecycle};
use proptest::prelude::*;
use risk::PrecisionAdapter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::broadcast;

fn run_path(side: Side, moves: Vec<(i64, u32)>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async move {
        let (events, _rx) = broadcast::channel(1024);
        let ctx = LifecycleContext {
            executor: Arc::new(PaperExecutor::new()),
            precision: Arc::new(PrecisionAdapter::new(TradingMode::Futures)),
            events,
            exit: ExitConfig::default(),
            hard_stop_orders: true,
        };
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let stop = side.offset(dec!(100), dec!(-10));
        let plan = EntryPlan {
            symbol: "BTC/USDT".into(),
            side,
            tier: SignalTier::A,
            strategy: StrategyKind::EmaPullback,
            quantity: dec!(1),
            reference_price: dec!(100),
            stop_price: stop,
            opened_at: t0,
        };
        let mut lc = PositionLifecycle::enter(plan, ctx).await.unwrap();

        let mut price = dec!(100);
        let mut last_size = lc.position().remaining_size;
        let mut last_stop = lc.position().current_stop;
        for (i, (step, atr)) in moves.into_iter().enumerate() {
            price = (price + Decimal::from(step)).max(dec!(1));
            let tick = MarketTick::new(price, Some(Decimal::from(atr)), t0 + Duration::minutes(i as i64 * 5));
            let _ = lc.monitor(&tick).await;

            let p = lc.position();
            prop_assert!(p.remaining_size <= last_size);
            prop_assert!(
                !side.is_more_favorable(last_stop, p.current_stop),
                "stop loosened from {} to {}",
                last_stop,
                p.current_stop
            );
            last_size = p.remaining_size;
            last_stop = p.current_stop;
            if !lc.is_active() {
                break;
            }
        }
        Ok(())
    })
}

proptest! {
    #[test]
    fn long_exit_is_monotonic(moves in prop::collection::vec((-6i64..=8, 1u32..=12), 1..60)) {
        run_path(Side::Long, moves)?;
    }

    #[test]
    fn short_exit_is_monotonic(moves in prop::collection::vec((-8i64..=6, 1u32..=12), 1..60)) {
        run_path(Side::Short, moves)?;
    }
}
