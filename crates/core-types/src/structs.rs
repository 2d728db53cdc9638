use crate::enums::{OrderSide, OrderType, Side, StrategyKind, StrengthGrade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub interval: String,
}

/// An entry opportunity produced by one of the signal detectors.
///
/// Candidates are immutable and consumed once within the cycle that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub symbol: String,
    pub side: Side,
    pub strategy: StrategyKind,
    pub entry_price: Decimal,
    /// The structural extreme the protective stop is measured from.
    pub stop_reference: Decimal,
    /// The level whose loss invalidates the pattern.
    pub stop_level: Decimal,
    pub target_reference: Decimal,
    pub atr: Decimal,
    pub volume_ratio: Decimal,
    pub strength: StrengthGrade,
    /// The signal bar itself closed in the trade's direction.
    pub candle_confirmed: bool,
}

/// An order the engine wants sent to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Trigger for stop orders.
    pub trigger_price: Option<Decimal>,
    pub reduce_only: bool,
    /// Last observed price, used for simulated fills and logging.
    pub reference_price: Decimal,
}

impl OrderRequest {
    pub fn market(
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
        reference_price: Decimal,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            trigger_price: None,
            reduce_only,
            reference_price,
        }
    }

    /// A reduce-only stop-market order.
    pub fn stop_market(symbol: &str, side: OrderSide, quantity: Decimal, trigger: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::StopMarket,
            quantity,
            trigger_price: Some(trigger),
            reduce_only: true,
            reference_price: trigger,
        }
    }
}

/// A confirmed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub order_id: String,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A position as the exchange reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// Exchange symbol id, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Positive for long, negative for short.
    pub signed_size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl ExchangePosition {
    pub fn is_flat(&self) -> bool {
        self.signed_size.is_zero()
    }
}

/// Venue trading rules for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Quantity increment.
    pub step_size: Decimal,
    pub min_qty: Decimal,
    /// Minimum order value in quote currency.
    pub min_notional: Decimal,
    /// Price increment. Zero when unknown.
    pub tick_size: Decimal,
}
