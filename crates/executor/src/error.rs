use api_client::error::ApiError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Order was not filled: {0}")]
    Rejected(String),

    #[error("A position is already open for symbol: {0}")]
    DuplicatePosition(String),

    #[error("Invalid order quantity for {symbol}: {quantity}")]
    InvalidQuantity { symbol: String, quantity: Decimal },
}
