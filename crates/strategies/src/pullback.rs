use crate::SignalDetector;
use configuration::Config;
use core_types::{Side, SignalCandidate, StrategyKind, StrengthGrade};
use indicators::{IndicatorFrame, Series};
use rust_decimal::Decimal;

/// EMA pullback continuation.
///
/// With the fast EMA stacked over the slow one, the previous bar's low came
/// within `threshold × fast EMA` of the fast EMA and the current close is back
/// above it. Mirrored for shorts.
#[derive(Debug, Clone)]
pub struct EmaPullback {
    threshold: Decimal,
    min_volume_ratio: Decimal,
    target_window: usize,
    stop_buffer_atr: Decimal,
    min_bars: usize,
}

impl EmaPullback {
    pub fn new(config: &Config) -> Self {
        let s = &config.strategies;
        Self {
            threshold: s.pullback_threshold,
            min_volume_ratio: s.pullback_min_volume_ratio,
            target_window: s.pullback_target_window,
            stop_buffer_atr: s.stop_buffer_atr,
            min_bars: s.min_bars,
        }
    }
}

impl SignalDetector for EmaPullback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EmaPullback
    }

    fn detect(&self, symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate> {
        let bars = frame.klines();
        if bars.len() < self.min_bars.max(2) {
            return None;
        }
        let last = bars.len() - 1;
        let (current, prev) = (&bars[last], &bars[last - 1]);
        let fast = frame.value(Series::EmaFast, last)?;
        let slow = frame.value(Series::EmaSlow, last)?;
        let atr = frame.value(Series::Atr, last)?;
        let touch = fast * self.threshold;
        let recent = &bars[bars.len().saturating_sub(self.target_window)..];

        let (side, stop_reference, stop_level, target, confirmed) = if fast > slow {
            if (prev.low - fast).abs() >= touch || current.close <= fast {
                return None;
            }
            let target = recent.iter().map(|k| k.high).max()?;
            let level = prev.low.min(slow) - atr * self.stop_buffer_atr;
            (Side::Long, prev.low, level, target, current.close > current.open)
        } else if fast < slow {
            if (prev.high - fast).abs() >= touch || current.close >= fast {
                return None;
            }
            let target = recent.iter().map(|k| k.low).min()?;
            let level = prev.high.max(slow) + atr * self.stop_buffer_atr;
            (Side::Short, prev.high, level, target, current.close < current.open)
        } else {
            return None;
        };

        let ratio = frame.volume_ratio(last)?;
        if ratio < self.min_volume_ratio {
            tracing::debug!(symbol, %ratio, "Pullback rejected on volume");
            return None;
        }

        tracing::info!(symbol, %side, "EMA pullback signal");
        Some(SignalCandidate {
            symbol: symbol.to_string(),
            side,
            strategy: StrategyKind::EmaPullback,
            entry_price: current.close,
            stop_reference,
            stop_level,
            target_reference: target,
            atr,
            volume_ratio: ratio,
            strength: StrengthGrade::Moderate,
            candle_confirmed: confirmed,
        })
    }
}
