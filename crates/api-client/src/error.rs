use thiserror::Error;

/// Binance error code for an order that no longer exists.
pub const UNKNOWN_ORDER_CODE: i64 = -2011;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Exchange rejected the request ({code}): {msg}")]
    Exchange { code: i64, msg: String },

    #[error("Unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Failed to sign the request: {0}")]
    Signing(String),

    #[error("API client misconfigured: {0}")]
    Config(String),
}

impl ApiError {
    /// Failures worth retrying: transport errors, throttling, server-side
    /// errors and Binance's own "try again" codes.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Http { status, .. } => *status == 429 || *status == 418 || *status >= 500,
            // -1001 disconnected, -1003 rate limited, -1007 backend timeout, -1021 clock skew.
            ApiError::Exchange { code, .. } => matches!(code, -1001 | -1003 | -1007 | -1021),
            _ => false,
        }
    }

    /// The order was already filled, cancelled or never existed.
    pub fn is_unknown_order(&self) -> bool {
        matches!(self, ApiError::Exchange { code, .. } if *code == UNKNOWN_ORDER_CODE)
    }
}
