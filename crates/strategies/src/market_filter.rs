use crate::error::StrategyError;
use crate::thresholds::{DynamicThresholdPolicy, mean};
use configuration::{Config, MarketFilterConfig};
use indicators::{IndicatorFrame, MIN_BARS, Series};
use rust_decimal::Decimal;
use serde::Serialize;

/// Bars before the current one averaged for the ATR spike check.
const ATR_SPIKE_WINDOW: usize = 10;

/// Verdict of the market-condition gate for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketCondition {
    pub tradable: bool,
    pub reason: String,
    /// Feeds tiering; only meaningful when `tradable`.
    pub strong_market: bool,
}

impl MarketCondition {
    fn pass(reason: impl Into<String>, strong_market: bool) -> Self {
        Self { tradable: true, reason: reason.into(), strong_market }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self { tradable: false, reason: reason.into(), strong_market: false }
    }
}

/// Gates a symbol on its trend-timeframe frame: trend strength, volatility
/// spikes and moving-average entanglement, first failing check wins.
#[derive(Debug, Clone)]
pub struct MarketConditionFilter {
    config: MarketFilterConfig,
    trend_ema_period: usize,
    thresholds: DynamicThresholdPolicy,
}

impl MarketConditionFilter {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.market_filter.clone(),
            trend_ema_period: config.indicators.trend_ema_period,
            thresholds: DynamicThresholdPolicy::new(config),
        }
    }

    pub fn evaluate(&self, frame: &IndicatorFrame, symbol: &str) -> Result<MarketCondition, StrategyError> {
        if !self.config.enabled {
            return Ok(MarketCondition::pass("filter disabled", true));
        }

        let required = MIN_BARS.max(self.trend_ema_period);
        if frame.len() < required {
            return Ok(MarketCondition::reject(format!(
                "insufficient history ({} of {required} bars)",
                frame.len()
            )));
        }

        let threshold = self.thresholds.adx_threshold(frame);
        let Some(adx) = frame.latest(Series::Adx) else {
            tracing::warn!(symbol, "ADX undefined on a full-length frame");
            return Ok(MarketCondition::reject("ADX unavailable"));
        };
        let strong_market = adx >= self.config.adx_strong_threshold;
        if adx < threshold {
            return Ok(MarketCondition::reject(format!(
                "weak trend (ADX {:.1} < {:.1})",
                adx, threshold
            )));
        }

        if let Some(ratio) = self.atr_spike_ratio(frame) {
            if ratio > self.config.atr_spike_multiplier {
                return Ok(MarketCondition::reject(format!("volatility spike (ATR {:.1}x)", ratio)));
            }
        }

        let fast = frame.close_ema(self.config.entanglement_fast_period)?;
        let slow = frame.close_ema(self.config.entanglement_slow_period)?;
        if let (Some(Some(fast)), Some(Some(slow))) = (fast.last(), slow.last()) {
            if !slow.is_zero() {
                let gap = (*fast - *slow).abs() / *slow;
                if gap < self.config.ema_entanglement_threshold {
                    return Ok(MarketCondition::reject(format!(
                        "moving averages entangled (gap {:.2}%)",
                        gap * Decimal::ONE_HUNDRED
                    )));
                }
            }
        }

        tracing::debug!(symbol, %adx, %threshold, strong_market, "Market condition passed");
        Ok(MarketCondition::pass("market conditions good", strong_market))
    }

    /// Current ATR over the mean of up to ten preceding bars.
    fn atr_spike_ratio(&self, frame: &IndicatorFrame) -> Option<Decimal> {
        let current = frame.latest(Series::Atr)?;
        let last = frame.len().checked_sub(1)?;
        let lookback = ATR_SPIKE_WINDOW.min(last);
        let window: Vec<Decimal> = (last - lookback..last)
            .filter_map(|i| frame.value(Series::Atr, i))
            .collect();
        let avg = mean(&window)?;
        (avg > Decimal::ZERO).then(|| current / avg)
    }
}
