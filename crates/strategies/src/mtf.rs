use crate::error::StrategyError;
use configuration::MtfConfig;
use core_types::Side;
use indicators::IndicatorFrame;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MtfAlignment {
    pub aligned: bool,
    pub reason: String,
}

impl MtfAlignment {
    fn soft(reason: &str) -> Self {
        Self { aligned: true, reason: reason.to_string() }
    }
}

/// Soft check that the middle timeframe's EMA stack agrees with a candidate.
/// It only feeds tiering and never vetoes a trade.
#[derive(Debug, Clone)]
pub struct MtfConfirmation {
    config: MtfConfig,
}

impl MtfConfirmation {
    pub fn new(config: &MtfConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn check(&self, frame: Option<&IndicatorFrame>, side: Side) -> Result<MtfAlignment, StrategyError> {
        if !self.config.enabled {
            return Ok(MtfAlignment::soft("MTF confirmation disabled"));
        }
        let Some(frame) = frame.filter(|f| !f.is_empty()) else {
            return Ok(MtfAlignment::soft("MTF data unavailable"));
        };
        if frame.len() < self.config.slow_ema_period {
            return Ok(MtfAlignment::soft("MTF data insufficient"));
        }

        let fast = frame.close_ema(self.config.fast_ema_period)?;
        let slow = frame.close_ema(self.config.slow_ema_period)?;
        let (Some(Some(fast)), Some(Some(slow)), Some(last)) = (fast.last(), slow.last(), frame.last_kline())
        else {
            return Ok(MtfAlignment::soft("MTF indicators unavailable"));
        };
        let price = last.close;

        let aligned = match side {
            Side::Long => price > *fast && fast > slow,
            Side::Short => price < *fast && fast < slow,
        };
        let reason = match (side, aligned) {
            (Side::Long, true) => "MTF bullish stack confirmed",
            (Side::Long, false) => "MTF not fully bullish",
            (Side::Short, true) => "MTF bearish stack confirmed",
            (Side::Short, false) => "MTF not fully bearish",
        };
        Ok(MtfAlignment { aligned, reason: reason.to_string() })
    }
}
