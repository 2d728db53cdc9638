use crate::error::ConfigError;
use crate::settings::Config;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// One year. Keeps the hold limit inside what a time delta can represent.
const MAX_HOLD_HOURS_LIMIT: i64 = 24 * 365;

fn fraction(name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be in (0, 1], got {value}"
        )));
    }
    Ok(())
}

fn positive(name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be greater than 0, got {value}"
        )));
    }
    Ok(())
}

fn period(name: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ValidationError(format!("{name} cannot be zero")));
    }
    Ok(())
}

impl Config {
    /// Rejects configurations the engine cannot trade with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.symbols.is_empty() {
            return Err(ConfigError::ValidationError(
                "trading.symbols must list at least one symbol".to_string(),
            ));
        }
        if self.trading.leverage == 0 {
            return Err(ConfigError::ValidationError(
                "trading.leverage cannot be zero".to_string(),
            ));
        }

        fraction("risk.risk_per_trade", self.risk.risk_per_trade)?;
        fraction("risk.max_total_risk", self.risk.max_total_risk)?;
        fraction("risk.max_position_fraction", self.risk.max_position_fraction)?;
        if self.risk.risk_per_trade > self.risk.max_total_risk {
            return Err(ConfigError::ValidationError(
                "risk.risk_per_trade cannot exceed risk.max_total_risk".to_string(),
            ));
        }

        let ind = &self.indicators;
        period("indicators.lookback_period", ind.lookback_period)?;
        period("indicators.volume_ma_period", ind.volume_ma_period)?;
        period("indicators.atr_period", ind.atr_period)?;
        period("indicators.trend_ema_period", ind.trend_ema_period)?;
        period("indicators.fast_ema_period", ind.fast_ema_period)?;
        period("indicators.slow_ema_period", ind.slow_ema_period)?;
        period("indicators.adx_period", ind.adx_period)?;
        positive("indicators.atr_multiplier", ind.atr_multiplier)?;
        if ind.fast_ema_period >= ind.slow_ema_period {
            return Err(ConfigError::ValidationError(
                "indicators.fast_ema_period must be shorter than slow_ema_period".to_string(),
            ));
        }

        period("mtf.fast_ema_period", self.mtf.fast_ema_period)?;
        period("mtf.slow_ema_period", self.mtf.slow_ema_period)?;
        period("market_filter.entanglement_fast_period", self.market_filter.entanglement_fast_period)?;
        period("market_filter.entanglement_slow_period", self.market_filter.entanglement_slow_period)?;
        period("strategies.breakout_window", self.strategies.breakout_window)?;
        period("exit.swing_window", self.exit.swing_window)?;

        let tiers = &self.tiers;
        positive("tiers.tier_a_multiplier", tiers.tier_a_multiplier)?;
        positive("tiers.tier_b_multiplier", tiers.tier_b_multiplier)?;
        positive("tiers.tier_c_multiplier", tiers.tier_c_multiplier)?;

        let exit = &self.exit;
        positive("exit.first_partial_pct", exit.first_partial_pct)?;
        positive("exit.second_partial_pct", exit.second_partial_pct)?;
        if exit.first_partial_pct + exit.second_partial_pct >= dec!(100) {
            return Err(ConfigError::ValidationError(
                "exit partial percentages must leave a trailing remainder".to_string(),
            ));
        }
        positive("exit.trailing_atr_multiplier", exit.trailing_atr_multiplier)?;
        if exit.max_hold_hours <= 0 || exit.max_hold_hours > MAX_HOLD_HOURS_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "exit.max_hold_hours must be between 1 and {MAX_HOLD_HOURS_LIMIT}"
            )));
        }

        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.poll_interval_secs cannot be zero".to_string(),
            ));
        }
        if self.engine.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_retries must allow at least one attempt".to_string(),
            ));
        }
        if self.telegram.enabled && (self.telegram.token.is_empty() || self.telegram.chat_id.is_empty()) {
            return Err(ConfigError::ValidationError(
                "telegram is enabled but token or chat_id is missing".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_partials_without_tail() {
        let mut config = Config::default();
        config.exit.first_partial_pct = dec!(50);
        config.exit.second_partial_pct = dec!(50);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_out_of_range_risk() {
        let mut config = Config::default();
        config.risk.risk_per_trade = dec!(1.5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.risk.risk_per_trade = dec!(0.1);
        assert!(config.validate().is_err(), "per-trade risk above the aggregate ceiling");
    }

    #[test]
    fn test_rejects_unbounded_hold_time() {
        let mut config = Config::default();
        config.exit.max_hold_hours = i64::MAX;
        assert!(config.validate().is_err());

        config.exit.max_hold_hours = MAX_HOLD_HOURS_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_universe() {
        let mut config = Config::default();
        config.trading.symbols.clear();
        assert!(config.validate().is_err());
    }
}
