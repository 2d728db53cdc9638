use configuration::{TradingDirection, TradingMode};
use core_types::Side;
use indicators::{IndicatorFrame, Series};

/// Whether a candidate agrees with close vs. the trend EMA on the trend timeframe.
///
/// Returns the verdict and a short description of the prevailing trend.
pub fn check_trend(frame: &IndicatorFrame, side: Side, trend_ema_period: usize) -> (bool, &'static str) {
    if frame.len() < trend_ema_period {
        return (false, "insufficient trend history");
    }
    let (Some(ema), Some(last)) = (frame.latest(Series::EmaTrend), frame.last_kline()) else {
        return (false, "trend EMA unavailable");
    };

    match side {
        Side::Long if last.close > ema => (true, "uptrend"),
        Side::Long => (false, "downtrend"),
        Side::Short if last.close < ema => (true, "downtrend"),
        Side::Short => (false, "uptrend"),
    }
}

/// The configured direction and trading mode allow opening `side`.
pub fn direction_allows(direction: TradingDirection, mode: TradingMode, side: Side) -> bool {
    match (side, direction) {
        (Side::Short, _) if mode == TradingMode::Spot => false,
        (_, TradingDirection::Both) => true,
        (Side::Long, TradingDirection::Long) | (Side::Short, TradingDirection::Short) => true,
        _ => false,
    }
}
