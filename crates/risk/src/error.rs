use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Insufficient account balance ({0}) to size a trade.")]
    InsufficientEquity(Decimal),

    #[error("Stop price equals the entry price; the trade has no defined risk.")]
    ZeroStopDistance,

    #[error("The provided entry price ({0}) is zero or negative.")]
    InvalidEntryPrice(Decimal),

    #[error("{symbol}: quantity {quantity} (value {notional}) is below the venue minimum")]
    BelowVenueMinimum {
        symbol: String,
        quantity: Decimal,
        notional: Decimal,
    },
}
