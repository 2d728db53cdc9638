use crate::error::ApiError;
use chrono::{TimeZone, Utc};
use core_types::{ExchangePosition, Kline, SymbolFilters};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.

/// The response from a successful order placement, futures or spot, with
/// `newOrderRespType=RESULT`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    #[serde(default)]
    pub client_order_id: String,
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub orig_qty: Decimal,
    /// Futures only.
    #[serde(default)]
    pub avg_price: Decimal,
    /// Spot only; Binance's spelling.
    #[serde(default, rename = "cummulativeQuoteQty")]
    pub cumulative_quote_qty: Decimal,
    #[serde(default)]
    pub stop_price: Decimal,
}

impl OrderResponse {
    /// Average fill price, if the response carries enough to tell.
    pub fn fill_price(&self) -> Option<Decimal> {
        if self.avg_price > Decimal::ZERO {
            return Some(self.avg_price);
        }
        if self.executed_qty > Decimal::ZERO && self.cumulative_quote_qty > Decimal::ZERO {
            return Some(self.cumulative_quote_qty / self.executed_qty);
        }
        None
    }
}

/// A single asset's balance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub asset: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// A single position from `GET /fapi/v2/positionRisk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionResponse {
    pub entry_price: Decimal,
    pub position_amt: Decimal,
    pub symbol: String,
    pub un_realized_profit: Decimal,
}

impl From<PositionResponse> for ExchangePosition {
    fn from(p: PositionResponse) -> Self {
        ExchangePosition {
            symbol: p.symbol,
            signed_size: p.position_amt,
            entry_price: p.entry_price,
            unrealized_pnl: p.un_realized_profit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpotAccount {
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpotBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl From<SpotBalance> for BalanceResponse {
    fn from(b: SpotBalance) -> Self {
        BalanceResponse {
            asset: b.asset,
            balance: b.free + b.locked,
            available_balance: b.free,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TickerPrice {
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

/// One entry of a symbol's `filters` array. Only the fields we read are kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFilter {
    pub filter_type: String,
    pub step_size: Option<Decimal>,
    pub min_qty: Option<Decimal>,
    pub tick_size: Option<Decimal>,
    /// Futures `MIN_NOTIONAL`.
    pub notional: Option<Decimal>,
    /// Spot `NOTIONAL` / `MIN_NOTIONAL`.
    pub min_notional: Option<Decimal>,
}

impl ExchangeInfo {
    pub fn into_filters(self) -> HashMap<String, SymbolFilters> {
        self.symbols
            .into_iter()
            .map(|info| {
                let mut f = SymbolFilters {
                    step_size: Decimal::ZERO,
                    min_qty: Decimal::ZERO,
                    min_notional: Decimal::ZERO,
                    tick_size: Decimal::ZERO,
                };
                for raw in info.filters {
                    match raw.filter_type.as_str() {
                        "LOT_SIZE" => {
                            f.step_size = raw.step_size.unwrap_or_default();
                            f.min_qty = raw.min_qty.unwrap_or_default();
                        }
                        "PRICE_FILTER" => f.tick_size = raw.tick_size.unwrap_or_default(),
                        "MIN_NOTIONAL" | "NOTIONAL" => {
                            f.min_notional = raw.notional.or(raw.min_notional).unwrap_or_default();
                        }
                        _ => {}
                    }
                }
                (info.symbol, f)
            })
            .collect()
    }
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

// Intermediate struct for deserializing klines from Binance API
#[derive(Deserialize)]
pub(crate) struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

fn decimal(field: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(field).map_err(|e| ApiError::Deserialization(e.to_string()))
}

impl RawKline {
    pub fn into_kline(self, interval: &str) -> Result<Kline, ApiError> {
        Ok(Kline {
            open_time: Utc
                .timestamp_millis_opt(self.0)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", self.0)))?,
            open: decimal(&self.1)?,
            high: decimal(&self.2)?,
            low: decimal(&self.3)?,
            close: decimal(&self.4)?,
            volume: decimal(&self.5)?,
            close_time: Utc
                .timestamp_millis_opt(self.6)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid close_time: {}", self.6)))?,
            interval: interval.to_string(),
        })
    }
}
