use crate::SignalDetector;
use crate::volume::VolumeGrader;
use configuration::Config;
use core_types::{Side, SignalCandidate, StrategyKind};
use indicators::{IndicatorFrame, Series};
use rust_decimal::Decimal;

/// Breakout-failure reversal ("2B").
///
/// The current bar pierces the prior range extreme and closes back inside it.
/// A bullish and a bearish failure on the same bar resolve to the bearish one.
#[derive(Debug, Clone)]
pub struct Reversal2B {
    lookback: usize,
    max_depth_atr: Decimal,
    volume: VolumeGrader,
}

impl Reversal2B {
    pub fn new(config: &Config) -> Self {
        Self {
            lookback: config.indicators.lookback_period,
            max_depth_atr: config.strategies.reversal_max_depth_atr,
            volume: VolumeGrader::new(&config.volume),
        }
    }
}

impl SignalDetector for Reversal2B {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Reversal2B
    }

    fn detect(&self, symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate> {
        let bars = frame.klines();
        if self.lookback == 0 || bars.len() < self.lookback + 1 {
            return None;
        }
        let last = bars.len() - 1;
        let current = &bars[last];
        let window = &bars[last - self.lookback..last];
        let prev_low = window.iter().map(|k| k.low).min()?;
        let prev_high = window.iter().map(|k| k.high).max()?;

        let bearish = current.high > prev_high && current.close < prev_high;
        let bullish = current.low < prev_low && current.close > prev_low;

        let (side, extreme, level, target, confirmed) = if bearish {
            (Side::Short, current.high, prev_high, prev_low, current.close < current.open)
        } else if bullish {
            (Side::Long, current.low, prev_low, prev_high, current.close > current.open)
        } else {
            return None;
        };

        let atr = frame.value(Series::Atr, last)?;
        let ratio = frame.volume_ratio(last)?;
        if !self.volume.accepts(ratio) {
            tracing::debug!(symbol, %ratio, "2B rejected on volume");
            return None;
        }

        // A deep penetration is a real breakdown, not a failed one.
        if (extreme - level).abs() >= atr * self.max_depth_atr {
            tracing::debug!(symbol, %extreme, %level, %atr, "2B rejected on penetration depth");
            return None;
        }

        Some(SignalCandidate {
            symbol: symbol.to_string(),
            side,
            strategy: StrategyKind::Reversal2B,
            entry_price: current.close,
            stop_reference: extreme,
            stop_level: level,
            target_reference: target,
            atr,
            volume_ratio: ratio,
            strength: self.volume.grade(ratio),
            candle_confirmed: confirmed,
        })
    }
}
