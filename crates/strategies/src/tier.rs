use configuration::TierConfig;
use core_types::{SignalTier, StrengthGrade};
use rust_decimal::Decimal;
use serde::Serialize;

/// The inputs the tier score is built from.
#[derive(Debug, Clone, Copy)]
pub struct TierInputs {
    pub mtf_aligned: bool,
    pub strong_market: bool,
    pub strength: StrengthGrade,
    pub candle_confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierDecision {
    pub tier: SignalTier,
    pub multiplier: Decimal,
    pub score: u8,
}

#[derive(Debug, Clone)]
pub struct SignalTierClassifier {
    config: TierConfig,
}

impl SignalTierClassifier {
    pub fn new(config: &TierConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Scores 2 for MTF alignment, 2 for a strong market, 0 to 2 for volume and
    /// 1 for a confirming candle. Six or more is A, four or more B, else C.
    pub fn classify(&self, inputs: TierInputs) -> TierDecision {
        if !self.config.enabled {
            return self.decision(SignalTier::B, 0);
        }

        let mut score = inputs.strength.tier_points();
        if inputs.mtf_aligned {
            score += 2;
        }
        if inputs.strong_market {
            score += 2;
        }
        if inputs.candle_confirmed {
            score += 1;
        }

        let tier = match score {
            6.. => SignalTier::A,
            4..=5 => SignalTier::B,
            _ => SignalTier::C,
        };
        self.decision(tier, score)
    }

    fn decision(&self, tier: SignalTier, score: u8) -> TierDecision {
        TierDecision { tier, multiplier: self.config.multiplier(tier), score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs(mtf: bool, strong: bool, strength: StrengthGrade, candle: bool) -> TierInputs {
        TierInputs { mtf_aligned: mtf, strong_market: strong, strength, candle_confirmed: candle }
    }

    #[test]
    fn test_tier_boundaries() {
        let c = SignalTierClassifier::new(&TierConfig::default());

        let a = c.classify(inputs(true, true, StrengthGrade::Strong, true));
        assert_eq!((a.tier, a.score, a.multiplier), (SignalTier::A, 7, dec!(1.0)));

        let four = c.classify(inputs(true, true, StrengthGrade::Weak, false));
        assert_eq!(four.tier, SignalTier::B);

        let b = c.classify(inputs(true, false, StrengthGrade::Moderate, true));
        assert_eq!((b.tier, b.score, b.multiplier), (SignalTier::B, 4, dec!(0.7)));

        let cc = c.classify(inputs(false, false, StrengthGrade::Explosive, true));
        assert_eq!((cc.tier, cc.score, cc.multiplier), (SignalTier::C, 3, dec!(0.5)));

        let six = c.classify(inputs(true, true, StrengthGrade::Moderate, true));
        assert_eq!(six.tier, SignalTier::A);
    }

    #[test]
    fn test_disabled_tiering_is_always_b() {
        let c = SignalTierClassifier::new(&TierConfig { enabled: false, ..Default::default() });
        let d = c.classify(inputs(true, true, StrengthGrade::Explosive, true));
        assert_eq!(d.tier, SignalTier::B);
        assert_eq!(d.multiplier, dec!(0.7));
    }
}
