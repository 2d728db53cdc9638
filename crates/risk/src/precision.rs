use crate::error::RiskError;
use configuration::TradingMode;
use core_types::{SymbolFilters, to_exchange_id};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;

const FALLBACK_STEP: Decimal = dec!(0.001);
const FUTURES_MIN_NOTIONAL: Decimal = dec!(5);
const SPOT_MIN_NOTIONAL: Decimal = dec!(10);

/// Step and tick sizes for well-known pairs, used when the venue did not report a symbol.
fn builtin_filters(id: &str) -> Option<SymbolFilters> {
    let (step, tick) = match id {
        "BTCUSDT" | "ETHUSDT" => (dec!(0.001), dec!(0.01)),
        "SOLUSDT" => (dec!(1), dec!(0.01)),
        "DOGEUSDT" => (dec!(1), dec!(0.00001)),
        "ADAUSDT" => (dec!(1), dec!(0.0001)),
        "LINKUSDT" => (dec!(0.01), dec!(0.001)),
        _ => return None,
    };
    Some(SymbolFilters { step_size: step, min_qty: step, min_notional: Decimal::ZERO, tick_size: tick })
}

/// A quantity after rounding up, and whether it was inflated to meet the minimum order value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rounded {
    pub quantity: Decimal,
    pub adjusted: bool,
}

/// Turns raw quantities into exchange-legal ones.
///
/// Rules come from the venue's metadata when loaded, then from a built-in
/// table, then from a 0.001 step.
#[derive(Debug, Clone)]
pub struct PrecisionAdapter {
    mode: TradingMode,
    filters: HashMap<String, SymbolFilters>,
}

impl PrecisionAdapter {
    pub fn new(mode: TradingMode) -> Self {
        Self { mode, filters: HashMap::new() }
    }

    /// Venue metadata keyed by exchange id (`BTCUSDT`).
    pub fn with_filters(mode: TradingMode, filters: HashMap<String, SymbolFilters>) -> Self {
        Self { mode, filters }
    }

    pub fn loaded_symbols(&self) -> usize {
        self.filters.len()
    }

    pub fn filters(&self, symbol: &str) -> SymbolFilters {
        let id = to_exchange_id(symbol);
        let mut filters = self
            .filters
            .get(&id)
            .copied()
            .or_else(|| builtin_filters(&id))
            .unwrap_or(SymbolFilters {
                step_size: FALLBACK_STEP,
                min_qty: FALLBACK_STEP,
                min_notional: Decimal::ZERO,
                tick_size: Decimal::ZERO,
            });
        if filters.step_size <= Decimal::ZERO {
            filters.step_size = FALLBACK_STEP;
        }
        filters
    }

    /// The larger of the venue's minimum order value and the mode default.
    pub fn min_notional(&self, symbol: &str) -> Decimal {
        let default = match self.mode {
            TradingMode::Futures => FUTURES_MIN_NOTIONAL,
            TradingMode::Spot => SPOT_MIN_NOTIONAL,
        };
        self.filters(symbol).min_notional.max(default)
    }

    /// Rounds toward zero onto the step grid. Used for closes.
    pub fn round_down(&self, symbol: &str, quantity: Decimal) -> Decimal {
        let step = self.filters(symbol).step_size;
        ((quantity / step).floor() * step).normalize()
    }

    /// Rounds up onto the step grid and inflates to the minimum order value. Used for opens.
    pub fn round_up(&self, symbol: &str, quantity: Decimal, price: Decimal) -> Rounded {
        let filters = self.filters(symbol);
        let step = filters.step_size;
        let ceil = |q: Decimal| ((q / step).ceil() * step).normalize();

        let mut rounded = ceil(quantity.max(filters.min_qty));
        let mut adjusted = false;
        let min_notional = self.min_notional(symbol);
        if price > Decimal::ZERO && rounded * price < min_notional {
            rounded = ceil(min_notional / price);
            adjusted = true;
            tracing::info!(symbol, %rounded, %min_notional, "Quantity raised to meet the minimum order value");
        }
        Rounded { quantity: rounded, adjusted }
    }

    /// Snaps a trigger price to the nearest tick. Unknown ticks leave it unchanged.
    pub fn round_price(&self, symbol: &str, price: Decimal) -> Decimal {
        let tick = self.filters(symbol).tick_size;
        if tick <= Decimal::ZERO {
            return price;
        }
        ((price / tick).round() * tick).normalize()
    }

    pub fn check_limits(&self, symbol: &str, quantity: Decimal, price: Decimal) -> Result<(), RiskError> {
        let notional = quantity * price;
        let filters = self.filters(symbol);
        if quantity <= Decimal::ZERO || quantity < filters.min_qty || notional < self.min_notional(symbol) {
            return Err(RiskError::BelowVenueMinimum {
                symbol: symbol.to_string(),
                quantity,
                notional,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> PrecisionAdapter {
        let mut loaded = HashMap::new();
        loaded.insert(
            "XRPUSDT".to_string(),
            SymbolFilters {
                step_size: dec!(0.1),
                min_qty: dec!(0.1),
                min_notional: dec!(5),
                tick_size: dec!(0.0001),
            },
        );
        PrecisionAdapter::with_filters(TradingMode::Futures, loaded)
    }

    #[test]
    fn test_filter_resolution_order() {
        let a = adapter();
        assert_eq!(a.filters("XRP/USDT").step_size, dec!(0.1));
        assert_eq!(a.filters("SOL/USDT").step_size, dec!(1));
        assert_eq!(a.filters("LINKUSDT").step_size, dec!(0.01));
        assert_eq!(a.filters("PEPE/USDT").step_size, dec!(0.001));
    }

    #[test]
    fn test_round_down_truncates_to_step() {
        let a = adapter();
        assert_eq!(a.round_down("BTC/USDT", dec!(0.0129)), dec!(0.012));
        assert_eq!(a.round_down("SOL/USDT", dec!(3.99)), dec!(3));
        assert_eq!(a.round_down("SOL/USDT", dec!(0.7)), dec!(0));
    }

    #[test]
    fn test_round_up_inflates_to_min_notional() {
        let a = adapter();
        let r = a.round_up("BTC/USDT", dec!(0.00001), dec!(60000));
        // 5 / 60000 = 0.0000833.. rounds up to the 0.001 step.
        assert_eq!(r, Rounded { quantity: dec!(0.001), adjusted: false });

        let r = a.round_up("XRP/USDT", dec!(1.01), dec!(0.5));
        assert_eq!(r, Rounded { quantity: dec!(10), adjusted: true });

        let r = a.round_up("ETH/USDT", dec!(0.0101), dec!(3000));
        assert_eq!(r, Rounded { quantity: dec!(0.011), adjusted: false });
    }

    #[test]
    fn test_prices_snap_to_tick() {
        let a = adapter();
        assert_eq!(a.round_price("BTC/USDT", dec!(64123.456)), dec!(64123.46));
        assert_eq!(a.round_price("XRP/USDT", dec!(0.51234)), dec!(0.5123));
        assert_eq!(a.round_price("NEW/USDT", dec!(1.23456789)), dec!(1.23456789));
    }

    #[test]
    fn test_spot_minimum_is_higher() {
        let spot = PrecisionAdapter::new(TradingMode::Spot);
        assert_eq!(spot.min_notional("BTC/USDT"), dec!(10));
        assert!(spot.check_limits("ETH/USDT", dec!(0.003), dec!(3000)).is_err());
        assert!(spot.check_limits("ETH/USDT", dec!(0.004), dec!(3000)).is_ok());
    }

    #[test]
    fn test_zero_quantity_fails_limits() {
        assert!(matches!(
            adapter().check_limits("BTC/USDT", Decimal::ZERO, dec!(60000)),
            Err(RiskError::BelowVenueMinimum { .. })
        ));
    }
}
