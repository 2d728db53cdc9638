use crate::RiskManager;
use crate::error::RiskError;
use crate::precision::PrecisionAdapter;
use configuration::{Config, RiskConfig, TradingMode};
use core_types::Side;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// The outcome of sizing one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSize {
    pub quantity: Decimal,
    pub notional: Decimal,
    /// Balance × risk-per-trade, before the notional cap.
    pub risk_amount: Decimal,
    /// The notional cap bound the size.
    pub capped: bool,
    /// Rounding up to the venue minimum changed the size.
    pub adjusted: bool,
}

/// What an open position still has at risk, as seen by the budget check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskExposure {
    pub side: Side,
    pub entry_price: Decimal,
    pub current_stop: Decimal,
    pub remaining_size: Decimal,
}

impl RiskExposure {
    /// Remaining size times the adverse distance from entry to stop. Stops at
    /// or past breakeven put nothing at risk.
    pub fn at_risk(&self) -> Decimal {
        let distance = self.side.favorable_move(self.current_stop, self.entry_price);
        self.remaining_size * distance.max(Decimal::ZERO)
    }
}

/// Fixed-fractional sizing with a hard notional cap.
#[derive(Debug, Clone)]
pub struct FixedFractionalRiskManager {
    params: RiskConfig,
    leverage: Decimal,
    precision: Arc<PrecisionAdapter>,
}

impl FixedFractionalRiskManager {
    pub fn new(config: &Config, precision: Arc<PrecisionAdapter>) -> Result<Self, RiskError> {
        let params = config.risk.clone();
        for (name, value) in [
            ("risk_per_trade", params.risk_per_trade),
            ("max_total_risk", params.max_total_risk),
            ("max_position_fraction", params.max_position_fraction),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(RiskError::InvalidParameters(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        let leverage = match config.trading.mode {
            TradingMode::Futures => Decimal::from(config.trading.leverage.max(1)),
            TradingMode::Spot => Decimal::ONE,
        };
        Ok(Self { params, leverage, precision })
    }

    pub fn precision(&self) -> &PrecisionAdapter {
        &self.precision
    }
}

impl RiskManager for FixedFractionalRiskManager {
    fn size_position(
        &self,
        symbol: &str,
        balance: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
        tier_multiplier: Decimal,
    ) -> Result<PositionSize, RiskError> {
        if entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(entry_price));
        }
        if balance <= Decimal::ZERO {
            return Err(RiskError::InsufficientEquity(balance));
        }

        let risk_amount = balance * self.params.risk_per_trade;
        let stop_fraction = (entry_price - stop_price).abs() / entry_price;
        if stop_fraction.is_zero() {
            return Err(RiskError::ZeroStopDistance);
        }

        let mut position_value = risk_amount / stop_fraction;
        let cap = balance * self.params.max_position_fraction * self.leverage;
        let capped = position_value > cap;
        if capped {
            tracing::warn!(symbol, %position_value, %cap, "Position value capped");
            position_value = cap;
        }

        let raw = position_value / entry_price * tier_multiplier;
        let rounded = self.precision.round_up(symbol, raw, entry_price);
        self.precision.check_limits(symbol, rounded.quantity, entry_price)?;

        let notional = rounded.quantity * entry_price;
        tracing::info!(
            symbol,
            quantity = %rounded.quantity,
            %notional,
            %tier_multiplier,
            "Position sized"
        );
        Ok(PositionSize {
            quantity: rounded.quantity,
            notional,
            risk_amount,
            capped,
            adjusted: rounded.adjusted,
        })
    }

    fn check_aggregate_risk(&self, exposures: &[RiskExposure], balance: Decimal) -> bool {
        if exposures.is_empty() {
            return true;
        }
        if balance <= Decimal::ZERO {
            return false;
        }
        let total: Decimal = exposures.iter().map(RiskExposure::at_risk).sum();
        let fraction = total / balance;
        tracing::debug!(%total, %fraction, ceiling = %self.params.max_total_risk, "Aggregate open risk");
        fraction <= self.params.max_total_risk
    }

    fn calculate_stop_loss(&self, extreme: Decimal, atr: Decimal, side: Side, multiplier: Decimal) -> Decimal {
        side.offset(extreme, -(atr * multiplier))
    }
}
