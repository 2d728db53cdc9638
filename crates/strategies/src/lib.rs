//! # Signal Library
//!
//! Pure decision logic over precomputed indicator frames: the market-condition
//! gate, dynamic thresholds, the three entry detectors, multi-timeframe
//! confirmation and signal tiering. Nothing here touches the network.
//!
//! Detectors implement [`SignalDetector`] and are assembled by
//! [`create_detectors`] into a priority-ordered [`Detector`] list.

pub mod breakout;
pub mod error;
pub mod factory;
pub mod market_filter;
pub mod mtf;
pub mod pullback;
pub mod reversal;
pub mod thresholds;
pub mod tier;
pub mod trend;
pub mod volume;

pub use breakout::VolumeBreakout;
pub use error::StrategyError;
pub use factory::{Detector, create_detectors, detect_best};
pub use market_filter::{MarketCondition, MarketConditionFilter};
pub use mtf::{MtfAlignment, MtfConfirmation};
pub use pullback::EmaPullback;
pub use reversal::Reversal2B;
pub use thresholds::DynamicThresholdPolicy;
pub use tier::{SignalTierClassifier, TierDecision, TierInputs};
pub use trend::{check_trend, direction_allows};
pub use volume::VolumeGrader;

use core_types::{SignalCandidate, StrategyKind};
use indicators::IndicatorFrame;

/// The capability every entry strategy implements.
///
/// Detection is stateless: the whole signal-timeframe frame is re-read each
/// cycle. `None` means "no setup on this bar" and is never an error.
pub trait SignalDetector: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn detect(&self, symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate>;
}
