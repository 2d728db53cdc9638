//! Raw indicator series over `f64` inputs.
//!
//! Every function returns one entry per input bar; `None` marks the warm-up
//! bars where the indicator is not yet defined.

use crate::error::IndicatorError;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage, SimpleMovingAverage};
use ta::{DataItem, Next};

/// One bar's high, low and close as `f64`.
#[derive(Debug, Clone, Copy)]
pub struct Hlc {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

fn warm_up<I: Next<f64, Output = f64>>(mut indicator: I, values: &[f64], period: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let out = indicator.next(*v);
            (i + 1 >= period).then_some(out)
        })
        .collect()
}

pub fn ema(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let indicator = ExponentialMovingAverage::new(period)
        .map_err(|e| IndicatorError::InvalidPeriod(format!("EMA({period}): {e:?}")))?;
    Ok(warm_up(indicator, values, period))
}

pub fn sma(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let indicator = SimpleMovingAverage::new(period)
        .map_err(|e| IndicatorError::InvalidPeriod(format!("SMA({period}): {e:?}")))?;
    Ok(warm_up(indicator, values, period))
}

pub fn atr(bars: &[Hlc], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let mut indicator = AverageTrueRange::new(period)
        .map_err(|e| IndicatorError::InvalidPeriod(format!("ATR({period}): {e:?}")))?;

    let mut out = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let item = DataItem::builder()
            .open(bar.close)
            .high(bar.high)
            .low(bar.low)
            .close(bar.close)
            .volume(0.0)
            .build()
            .map_err(|e| IndicatorError::Library(format!("{e:?}")))?;
        let value = indicator.next(&item);
        out.push((i + 1 >= period).then_some(value));
    }
    Ok(out)
}

/// Wilder's Average Directional Index.
///
/// The first value lands on bar `2 * period - 1`: `period` bars to seed the
/// smoothed directional movement and another `period` DX values to seed the ADX.
pub fn adx(bars: &[Hlc], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod("ADX(0)".to_string()));
    }
    let n = bars.len();
    let mut out = vec![None; n];
    if n < 2 * period {
        return Ok(out);
    }

    let p = period as f64;
    let mut tr_sm = 0.0;
    let mut plus_sm = 0.0;
    let mut minus_sm = 0.0;
    let mut dx_seed = 0.0;
    let mut adx_prev: Option<f64> = None;

    for i in 1..n {
        let (cur, prev) = (bars[i], bars[i - 1]);
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());

        if i <= period {
            tr_sm += tr;
            plus_sm += plus_dm;
            minus_sm += minus_dm;
            if i < period {
                continue;
            }
        } else {
            tr_sm = tr_sm - tr_sm / p + tr;
            plus_sm = plus_sm - plus_sm / p + plus_dm;
            minus_sm = minus_sm - minus_sm / p + minus_dm;
        }

        let (plus_di, minus_di) = if tr_sm > 0.0 {
            (100.0 * plus_sm / tr_sm, 100.0 * minus_sm / tr_sm)
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        match adx_prev {
            None => {
                dx_seed += dx;
                if i == 2 * period - 1 {
                    let seeded = dx_seed / p;
                    adx_prev = Some(seeded);
                    out[i] = Some(seeded);
                }
            }
            Some(prev_adx) => {
                let next = (prev_adx * (p - 1.0) + dx) / p;
                adx_prev = Some(next);
                out[i] = Some(next);
            }
        }
    }
    Ok(out)
}
