//! Conversions between display symbols (`BTC/USDT`) and exchange ids (`BTCUSDT`).

use crate::error::CoreError;

const QUOTE_ASSETS: [&str; 3] = ["USDT", "USDC", "BUSD"];

/// `BTC/USDT` -> `BTCUSDT`. Ids without a separator pass through unchanged.
pub fn to_exchange_id(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

/// `BTCUSDT` -> `BTC/USDT`.
pub fn from_exchange_id(id: &str) -> Result<String, CoreError> {
    if id.contains('/') {
        return Ok(id.to_uppercase());
    }
    let upper = id.to_uppercase();
    QUOTE_ASSETS
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| format!("{base}/{quote}"))
        })
        .ok_or_else(|| CoreError::InvalidInput("symbol".to_string(), id.to_string()))
}
