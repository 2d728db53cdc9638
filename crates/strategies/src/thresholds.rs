use configuration::{Config, DynamicThresholdConfig};
use indicators::{IndicatorFrame, Series};
use rust_decimal::Decimal;

/// Bars averaged when judging the ADX regime.
const ADX_REGIME_WINDOW: usize = 20;
/// Recent and historical windows for the ATR ratio.
const ATR_RECENT_WINDOW: usize = 5;
const ATR_HISTORY_WINDOW: usize = 15;

pub(crate) fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len()))
}

/// Adapts the ADX acceptance threshold and the ATR stop multiplier to the
/// recent regime of a trend-timeframe frame.
#[derive(Debug, Clone)]
pub struct DynamicThresholdPolicy {
    config: DynamicThresholdConfig,
    static_adx: Decimal,
    static_atr_multiplier: Decimal,
}

impl DynamicThresholdPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.dynamic_thresholds.clone(),
            static_adx: config.market_filter.adx_threshold,
            static_atr_multiplier: config.indicators.atr_multiplier,
        }
    }

    /// ADX a market must reach to be tradable.
    ///
    /// A weak trailing mean lowers the bar to admit more setups, a strong one
    /// raises it. Fewer than 20 defined ADX values keeps the static threshold.
    pub fn adx_threshold(&self, frame: &IndicatorFrame) -> Decimal {
        if !self.config.enabled {
            return self.static_adx;
        }
        let adx = frame.defined(Series::Adx);
        if adx.len() < ADX_REGIME_WINDOW {
            return self.static_adx;
        }
        let Some(avg) = mean(&adx[adx.len() - ADX_REGIME_WINDOW..]) else {
            return self.static_adx;
        };

        if avg < self.config.weak_regime_mean {
            self.config.adx_base_threshold
        } else if avg > self.config.strong_regime_mean {
            self.config.adx_strong_regime_threshold
        } else {
            self.static_adx
        }
    }

    /// ATR multiple used to place the initial stop beyond the structural extreme.
    pub fn atr_multiplier(&self, frame: &IndicatorFrame) -> Decimal {
        if !self.config.enabled {
            return self.static_atr_multiplier;
        }
        let atr = frame.defined(Series::Atr);
        let needed = ATR_RECENT_WINDOW + ATR_HISTORY_WINDOW;
        if atr.len() < needed {
            return self.static_atr_multiplier;
        }

        let tail = &atr[atr.len() - needed..];
        let (history, recent) = tail.split_at(ATR_HISTORY_WINDOW);
        let (Some(historical), Some(recent)) = (mean(history), mean(recent)) else {
            return self.static_atr_multiplier;
        };
        if historical.is_zero() {
            return self.static_atr_multiplier;
        }

        let ratio = recent / historical;
        tracing::debug!(%ratio, "ATR regime ratio");
        if ratio < self.config.quiet_ratio {
            self.config.atr_quiet_multiplier
        } else if ratio > self.config.volatile_ratio {
            self.config.atr_volatile_multiplier
        } else {
            self.config.atr_normal_multiplier
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_bars, frame_with};
    use indicators::DerivedSeries;
    use rust_decimal_macros::dec;

    fn policy() -> DynamicThresholdPolicy {
        DynamicThresholdPolicy::new(&Config::default())
    }

    fn adx_frame(value: Decimal, defined: usize) -> IndicatorFrame {
        let n = 60;
        let adx = (0..n).map(|i| (i >= n - defined).then_some(value)).collect();
        frame_with(flat_bars(n), DerivedSeries { adx, ..Default::default() })
    }

    fn atr_frame(history: Decimal, recent: Decimal) -> IndicatorFrame {
        let n = 60;
        let atr = (0..n)
            .map(|i| Some(if i >= n - ATR_RECENT_WINDOW { recent } else { history }))
            .collect();
        frame_with(flat_bars(n), DerivedSeries { atr, ..Default::default() })
    }

    #[test]
    fn test_adx_threshold_follows_regime() {
        let p = policy();
        assert_eq!(p.adx_threshold(&adx_frame(dec!(15), 30)), dec!(18));
        assert_eq!(p.adx_threshold(&adx_frame(dec!(35), 30)), dec!(25));
        assert_eq!(p.adx_threshold(&adx_frame(dec!(25), 30)), dec!(20));
    }

    #[test]
    fn test_short_adx_history_uses_static_threshold() {
        assert_eq!(policy().adx_threshold(&adx_frame(dec!(10), 19)), dec!(20));
    }

    #[test]
    fn test_atr_multiplier_follows_volatility() {
        let p = policy();
        assert_eq!(p.atr_multiplier(&atr_frame(dec!(10), dec!(7))), dec!(1.2));
        assert_eq!(p.atr_multiplier(&atr_frame(dec!(10), dec!(16))), dec!(2.0));
        assert_eq!(p.atr_multiplier(&atr_frame(dec!(10), dec!(10))), dec!(1.5));
        assert_eq!(p.atr_multiplier(&atr_frame(dec!(0), dec!(3))), dec!(1.5));
    }

    #[test]
    fn test_disabled_policy_is_static() {
        let mut config = Config::default();
        config.dynamic_thresholds.enabled = false;
        config.indicators.atr_multiplier = dec!(1.7);
        let p = DynamicThresholdPolicy::new(&config);
        assert_eq!(p.adx_threshold(&adx_frame(dec!(15), 30)), dec!(20));
        assert_eq!(p.atr_multiplier(&atr_frame(dec!(10), dec!(16))), dec!(1.7));
    }
}
