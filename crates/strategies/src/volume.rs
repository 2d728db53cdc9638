use configuration::VolumeConfig;
use core_types::StrengthGrade;
use rust_decimal::Decimal;

/// Grades volume ratios and decides whether a reversal's volume is acceptable.
#[derive(Debug, Clone)]
pub struct VolumeGrader {
    config: VolumeConfig,
}

impl VolumeGrader {
    pub fn new(config: &VolumeConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn grade(&self, ratio: Decimal) -> StrengthGrade {
        StrengthGrade::from_volume_ratio(
            ratio,
            self.config.explosive_threshold,
            self.config.strong_threshold,
            self.config.moderate_threshold,
        )
    }

    /// With grading on, the ratio must clear the minimum and weak grades are
    /// optional. With grading off, volume must simply beat its average.
    pub fn accepts(&self, ratio: Decimal) -> bool {
        if !self.config.grading_enabled {
            return ratio > Decimal::ONE;
        }
        if ratio < self.config.minimum_threshold {
            return false;
        }
        self.config.accept_weak_signals || self.grade(ratio) != StrengthGrade::Weak
    }
}
