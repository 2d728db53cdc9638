use crate::SignalDetector;
use crate::breakout::VolumeBreakout;
use crate::error::StrategyError;
use crate::pullback::EmaPullback;
use crate::reversal::Reversal2B;
use configuration::Config;
use core_types::{SignalCandidate, StrategyKind};
use indicators::IndicatorFrame;

/// The closed set of entry detectors.
#[derive(Debug, Clone)]
pub enum Detector {
    VolumeBreakout(VolumeBreakout),
    Reversal2B(Reversal2B),
    EmaPullback(EmaPullback),
}

impl SignalDetector for Detector {
    fn kind(&self) -> StrategyKind {
        match self {
            Detector::VolumeBreakout(d) => d.kind(),
            Detector::Reversal2B(d) => d.kind(),
            Detector::EmaPullback(d) => d.kind(),
        }
    }

    fn detect(&self, symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate> {
        match self {
            Detector::VolumeBreakout(d) => d.detect(symbol, frame),
            Detector::Reversal2B(d) => d.detect(symbol, frame),
            Detector::EmaPullback(d) => d.detect(symbol, frame),
        }
    }
}

/// Builds every enabled detector, highest priority first.
pub fn create_detectors(config: &Config) -> Result<Vec<Detector>, StrategyError> {
    let s = &config.strategies;
    if config.indicators.lookback_period == 0 {
        return Err(StrategyError::InvalidParameters(
            "2B lookback period cannot be zero".to_string(),
        ));
    }
    if s.breakout_window == 0 {
        return Err(StrategyError::InvalidParameters(
            "Breakout window cannot be zero".to_string(),
        ));
    }

    let mut detectors = Vec::with_capacity(3);
    if s.volume_breakout_enabled {
        detectors.push(Detector::VolumeBreakout(VolumeBreakout::new(config)));
    }
    if s.reversal_enabled {
        detectors.push(Detector::Reversal2B(Reversal2B::new(config)));
    }
    if s.ema_pullback_enabled {
        detectors.push(Detector::EmaPullback(EmaPullback::new(config)));
    }
    detectors.sort_by_key(|d| d.kind().priority());
    Ok(detectors)
}

/// Runs every detector and keeps the highest-priority candidate.
pub fn detect_best(detectors: &[Detector], symbol: &str, frame: &IndicatorFrame) -> Option<SignalCandidate> {
    detectors
        .iter()
        .filter_map(|d| d.detect(symbol, frame))
        .min_by_key(|c| c.strategy.priority())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar, flat_frame_with_last};
    use rust_decimal_macros::dec;

    #[test]
    fn test_detectors_are_priority_ordered() {
        let detectors = create_detectors(&Config::default()).unwrap();
        let kinds: Vec<_> = detectors.iter().map(SignalDetector::kind).collect();
        assert_eq!(
            kinds,
            vec![StrategyKind::VolumeBreakout, StrategyKind::Reversal2B, StrategyKind::EmaPullback]
        );
    }

    #[test]
    fn test_disabled_detectors_are_skipped() {
        let mut config = Config::default();
        config.strategies.volume_breakout_enabled = false;
        config.strategies.ema_pullback_enabled = false;
        let detectors = create_detectors(&config).unwrap();
        assert_eq!(detectors.len(), 1);
        assert_eq!(detectors[0].kind(), StrategyKind::Reversal2B);
    }

    #[test]
    fn test_breakout_beats_reversal_on_same_bar() {
        // Sweeps the prior low, closes back inside and then through the high on heavy volume.
        let frame = flat_frame_with_last(bar(dec!(99.5), dec!(102), dec!(98.5), dec!(101.8), dec!(3000)), dec!(2));
        let detectors = create_detectors(&Config::default()).unwrap();

        let reversal = detectors[1].detect("BTC/USDT", &frame);
        assert!(reversal.is_some(), "the reversal fires on its own");

        let best = detect_best(&detectors, "BTC/USDT", &frame).unwrap();
        assert_eq!(best.strategy, StrategyKind::VolumeBreakout);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut config = Config::default();
        config.strategies.breakout_window = 0;
        assert!(matches!(create_detectors(&config), Err(StrategyError::InvalidParameters(_))));
    }
}
