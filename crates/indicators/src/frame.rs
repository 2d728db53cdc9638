use crate::error::IndicatorError;
use crate::series::{self, Hlc};
use configuration::IndicatorConfig;
use core_types::Kline;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// Frames with fewer bars than this carry no derived values at all.
pub const MIN_BARS: usize = 50;

/// The derived series carried by an [`IndicatorFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    EmaTrend,
    EmaFast,
    EmaSlow,
    Atr,
    Adx,
    VolumeMa,
}

/// A candle series plus aligned indicator series.
///
/// `None` means "insufficient data" and must never be read as zero.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    klines: Vec<Kline>,
    ema_trend: Vec<Option<Decimal>>,
    ema_fast: Vec<Option<Decimal>>,
    ema_slow: Vec<Option<Decimal>>,
    atr: Vec<Option<Decimal>>,
    adx: Vec<Option<Decimal>>,
    volume_ma: Vec<Option<Decimal>>,
}

/// Precomputed series for [`IndicatorFrame::from_series`]. Empty vectors mean "all undefined".
#[derive(Debug, Clone, Default)]
pub struct DerivedSeries {
    pub ema_trend: Vec<Option<Decimal>>,
    pub ema_fast: Vec<Option<Decimal>>,
    pub ema_slow: Vec<Option<Decimal>>,
    pub atr: Vec<Option<Decimal>>,
    pub adx: Vec<Option<Decimal>>,
    pub volume_ma: Vec<Option<Decimal>>,
}

pub(crate) fn to_f64(value: Decimal, what: &'static str) -> Result<f64, IndicatorError> {
    value.to_f64().ok_or(IndicatorError::Conversion(what))
}

fn to_decimal(series: Vec<Option<f64>>, what: &'static str) -> Result<Vec<Option<Decimal>>, IndicatorError> {
    series
        .into_iter()
        .map(|v| match v {
            Some(x) => Decimal::from_f64(x)
                .map(|d| Some(d.round_dp(8)))
                .ok_or(IndicatorError::Conversion(what)),
            None => Ok(None),
        })
        .collect()
}

impl IndicatorFrame {
    /// Computes every configured indicator over `klines`.
    pub fn compute(klines: Vec<Kline>, config: &IndicatorConfig) -> Result<Self, IndicatorError> {
        let n = klines.len();
        if n < MIN_BARS {
            tracing::debug!(bars = n, "Too few bars for indicators; frame left undefined.");
            return Ok(Self::undefined(klines));
        }

        let closes = klines
            .iter()
            .map(|k| to_f64(k.close, "close"))
            .collect::<Result<Vec<_>, _>>()?;
        let volumes = klines
            .iter()
            .map(|k| to_f64(k.volume, "volume"))
            .collect::<Result<Vec<_>, _>>()?;
        let bars = klines
            .iter()
            .map(|k| {
                Ok(Hlc {
                    high: to_f64(k.high, "high")?,
                    low: to_f64(k.low, "low")?,
                    close: to_f64(k.close, "close")?,
                })
            })
            .collect::<Result<Vec<_>, IndicatorError>>()?;

        Ok(Self {
            ema_trend: to_decimal(series::ema(&closes, config.trend_ema_period)?, "trend EMA")?,
            ema_fast: to_decimal(series::ema(&closes, config.fast_ema_period)?, "fast EMA")?,
            ema_slow: to_decimal(series::ema(&closes, config.slow_ema_period)?, "slow EMA")?,
            atr: to_decimal(series::atr(&bars, config.atr_period)?, "ATR")?,
            adx: to_decimal(series::adx(&bars, config.adx_period)?, "ADX")?,
            volume_ma: to_decimal(series::sma(&volumes, config.volume_ma_period)?, "volume MA")?,
            klines,
        })
    }

    /// Builds a frame from series computed elsewhere (replayed data, fixtures).
    pub fn from_series(klines: Vec<Kline>, derived: DerivedSeries) -> Result<Self, IndicatorError> {
        let n = klines.len();
        let fit = |v: Vec<Option<Decimal>>, name: &'static str| {
            if v.is_empty() {
                Ok(vec![None; n])
            } else if v.len() == n {
                Ok(v)
            } else {
                Err(IndicatorError::InvalidPeriod(format!(
                    "{name} has {} values for {n} bars",
                    v.len()
                )))
            }
        };
        Ok(Self {
            ema_trend: fit(derived.ema_trend, "trend EMA")?,
            ema_fast: fit(derived.ema_fast, "fast EMA")?,
            ema_slow: fit(derived.ema_slow, "slow EMA")?,
            atr: fit(derived.atr, "ATR")?,
            adx: fit(derived.adx, "ADX")?,
            volume_ma: fit(derived.volume_ma, "volume MA")?,
            klines,
        })
    }

    fn undefined(klines: Vec<Kline>) -> Self {
        let n = klines.len();
        Self {
            klines,
            ema_trend: vec![None; n],
            ema_fast: vec![None; n],
            ema_slow: vec![None; n],
            atr: vec![None; n],
            adx: vec![None; n],
            volume_ma: vec![None; n],
        }
    }

    pub fn len(&self) -> usize {
        self.klines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    pub fn klines(&self) -> &[Kline] {
        &self.klines
    }

    pub fn last_kline(&self) -> Option<&Kline> {
        self.klines.last()
    }

    pub fn series(&self, series: Series) -> &[Option<Decimal>] {
        match series {
            Series::EmaTrend => &self.ema_trend,
            Series::EmaFast => &self.ema_fast,
            Series::EmaSlow => &self.ema_slow,
            Series::Atr => &self.atr,
            Series::Adx => &self.adx,
            Series::VolumeMa => &self.volume_ma,
        }
    }

    pub fn value(&self, series: Series, index: usize) -> Option<Decimal> {
        self.series(series).get(index).copied().flatten()
    }

    /// Value on the most recent bar.
    pub fn latest(&self, series: Series) -> Option<Decimal> {
        self.series(series).last().copied().flatten()
    }

    /// The defined values of a series, oldest first.
    pub fn defined(&self, series: Series) -> Vec<Decimal> {
        self.series(series).iter().flatten().copied().collect()
    }

    /// Current volume over its moving average. Zero when the average is zero.
    pub fn volume_ratio(&self, index: usize) -> Option<Decimal> {
        let kline = self.klines.get(index)?;
        let ma = self.value(Series::VolumeMa, index)?;
        if ma.is_zero() {
            return Some(Decimal::ZERO);
        }
        Some(kline.volume / ma)
    }

    /// An EMA of closes with an arbitrary period, computed on demand.
    pub fn close_ema(&self, period: usize) -> Result<Vec<Option<Decimal>>, IndicatorError> {
        let closes = self
            .klines
            .iter()
            .map(|k| to_f64(k.close, "close"))
            .collect::<Result<Vec<_>, _>>()?;
        to_decimal(series::ema(&closes, period)?, "EMA")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn klines(n: usize) -> Vec<Kline> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let base = Decimal::from(100 + i as i64);
                Kline {
                    open_time: start + Duration::hours(i as i64),
                    open: base,
                    high: base + dec!(2),
                    low: base - dec!(2),
                    close: base + dec!(1),
                    volume: dec!(1000),
                    close_time: start + Duration::hours(i as i64 + 1),
                    interval: "1h".to_string(),
                }
            })
            .collect()
    }

    #[test]
    fn test_short_history_is_undefined() {
        let frame = IndicatorFrame::compute(klines(49), &IndicatorConfig::default()).unwrap();
        assert_eq!(frame.len(), 49);
        assert!(frame.latest(Series::Atr).is_none());
        assert!(frame.latest(Series::VolumeMa).is_none());
        assert!(frame.defined(Series::EmaFast).is_empty());
    }

    #[test]
    fn test_from_series_checks_lengths() {
        let bars = klines(10);
        let ok = IndicatorFrame::from_series(
            bars.clone(),
            DerivedSeries { atr: vec![Some(dec!(1)); 10], ..Default::default() },
        )
        .unwrap();
        assert_eq!(ok.latest(Series::Atr), Some(dec!(1)));
        assert!(ok.latest(Series::Adx).is_none());

        let bad = IndicatorFrame::from_series(
            bars,
            DerivedSeries { adx: vec![Some(dec!(30)); 3], ..Default::default() },
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_series_are_aligned() {
        let frame = IndicatorFrame::compute(klines(120), &IndicatorConfig::default()).unwrap();
        for series in [Series::EmaTrend, Series::EmaFast, Series::Atr, Series::Adx, Series::VolumeMa] {
            assert_eq!(frame.series(series).len(), 120);
        }
        // 200-period trend EMA never warms up on 120 bars.
        assert!(frame.latest(Series::EmaTrend).is_none());
        assert!(frame.latest(Series::EmaFast).is_some());
        assert_eq!(frame.value(Series::VolumeMa, 18), None);
        assert_eq!(frame.volume_ratio(119), Some(dec!(1)));
    }
}
