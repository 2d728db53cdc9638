use crate::SignalDetector;
use configuration::Config;
use core_types::{Side, SignalCandidate, StrategyKind, StrengthGrade};
use indicators::{IndicatorFrame, Series};
use rust_decimal::Decimal;

/// Volume breakout continuation: heavy volume and a close beyond the prior
/// range with a body in the same direction.
#[derive(Debug, Clone)]
pub struct VolumeBreakout {
    volume_multiplier: Decimal,
    window: usize,
    stop_buffer_atr: Decimal,
    min_bars: usize,
}

impl VolumeBreakout {
    pub fn new(config: &Config) -> Self {
        let s = &config.strategies;
        Self {
            volume_multiplier: s.breakout_volume_multiplier,
            window: s.breakout_window,
            stop_buffer_atr: s.stop_buffer_atr,
            min_bars: s.min_bars,
        }
    }
}

impl SignalDetector for VolumeBreakout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VolumeBreakout
    }

    fn detect(&self, symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate> {
        let bars = frame.klines();
        if self.window == 0 || bars.len() < self.min_bars.max(self.window + 1) {
            return None;
        }
        let last = bars.len() - 1;
        let current = &bars[last];

        let ratio = frame.volume_ratio(last)?;
        if ratio < self.volume_multiplier {
            return None;
        }

        let range = &bars[last - self.window..last];
        let recent_high = range.iter().map(|k| k.high).max()?;
        let recent_low = range.iter().map(|k| k.low).min()?;
        let atr = frame.value(Series::Atr, last)?;
        let buffer = atr * self.stop_buffer_atr;
        let close = current.close;

        let (side, stop_reference, stop_level, target) = if close > recent_high && close > current.open {
            (Side::Long, recent_low, recent_low - buffer, close + (close - recent_low))
        } else if close < recent_low && close < current.open {
            (Side::Short, recent_high, recent_high + buffer, close - (recent_high - close))
        } else {
            return None;
        };

        tracing::info!(symbol, %side, %ratio, "Volume breakout signal");
        Some(SignalCandidate {
            symbol: symbol.to_string(),
            side,
            strategy: StrategyKind::VolumeBreakout,
            entry_price: close,
            stop_reference,
            stop_level,
            target_reference: target,
            atr,
            volume_ratio: ratio,
            strength: StrengthGrade::Strong,
            candle_confirmed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar, flat_frame_with_last};
    use rust_decimal_macros::dec;

    #[test]
    fn test_breakout_above_range_on_volume() {
        let frame = flat_frame_with_last(bar(dec!(100.5), dec!(103.5), dec!(100.2), dec!(103), dec!(2500)), dec!(2));
        let c = VolumeBreakout::new(&Config::default()).detect("SOL/USDT", &frame).unwrap();
        assert_eq!(c.side, Side::Long);
        assert_eq!(c.stop_reference, dec!(99));
        assert_eq!(c.stop_level, dec!(98));
        assert_eq!(c.target_reference, dec!(107));
        assert_eq!(c.strength, StrengthGrade::Strong);
        assert!(c.candle_confirmed);
    }

    #[test]
    fn test_breakdown_below_range_on_volume() {
        let frame = flat_frame_with_last(bar(dec!(99.5), dec!(99.8), dec!(96.5), dec!(97), dec!(3000)), dec!(2));
        let c = VolumeBreakout::new(&Config::default()).detect("SOL/USDT", &frame).unwrap();
        assert_eq!(c.side, Side::Short);
        assert_eq!(c.stop_level, dec!(102));
        assert_eq!(c.target_reference, dec!(93));
    }

    #[test]
    fn test_breakout_without_volume_is_ignored() {
        let frame = flat_frame_with_last(bar(dec!(100.5), dec!(103.5), dec!(100.2), dec!(103), dec!(1900)), dec!(2));
        assert!(VolumeBreakout::new(&Config::default()).detect("SOL/USDT", &frame).is_none());
    }

    #[test]
    fn test_opposite_body_is_ignored() {
        let frame = flat_frame_with_last(bar(dec!(104), dec!(104.5), dec!(101.5), dec!(103), dec!(2500)), dec!(2));
        assert!(VolumeBreakout::new(&Config::default()).detect("SOL/USDT", &frame).is_none());
    }
}
