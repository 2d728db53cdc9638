//! # Tradelane Indicators
//!
//! Derived series for one candle series: trend/fast/slow EMAs, ATR, ADX and a
//! volume moving average, all aligned bar-for-bar with the input candles.

pub mod error;
pub mod frame;
pub mod series;

pub use error::IndicatorError;
pub use frame::{DerivedSeries, IndicatorFrame, MIN_BARS, Series};
