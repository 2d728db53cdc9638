use crate::auth::sign_request;
use crate::error::ApiError;
use crate::responses::{ExchangeInfo, PositionResponse, RawKline, SpotAccount, TickerPrice};
use async_trait::async_trait;
use chrono::Utc;
use configuration::{ApiKeys, TradingMode};
use core_types::{
    ExchangePosition, Kline, OrderRequest, OrderType, SymbolFilters, to_exchange_id,
};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};

mod auth;
pub mod error;
pub mod responses;
pub mod retry;

// --- Public API ---
pub use responses::{ApiErrorResponse, BalanceResponse, OrderResponse};
pub use retry::{RetryPolicy, with_retry};

const RECV_WINDOW_MS: &str = "5000";

/// The exchange interface the engine and the live executor talk to.
///
/// Symbols are accepted in display form (`BTC/USDT`) or as exchange ids.
/// Implementations must not retry on their own; callers decide what is safe
/// to repeat.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// The most recent `limit` bars, oldest first.
    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<Kline>, ApiError>;

    async fn get_ticker_price(&self, symbol: &str) -> Result<Decimal, ApiError>;

    /// Sets the leverage for a given symbol. A no-op where leverage does not apply.
    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<(), ApiError>;

    /// Places a new order on the exchange.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ApiError>;

    /// Fetches the current account balance for all assets.
    async fn get_account_balance(&self) -> Result<Vec<BalanceResponse>, ApiError>;

    /// Every open position. Empty where the venue has no position concept.
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError>;

    /// Trading rules keyed by exchange id.
    async fn get_exchange_filters(&self) -> Result<HashMap<String, SymbolFilters>, ApiError>;

    /// Available balance of one asset, zero when the account does not hold it.
    async fn available_balance(&self, asset: &str) -> Result<Decimal, ApiError> {
        let balances = self.get_account_balance().await?;
        Ok(balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .map(|b| b.available_balance)
            .unwrap_or_default())
    }
}

/// REST paths for one Binance market.
#[derive(Debug, Clone, Copy)]
struct Endpoints {
    klines: &'static str,
    ticker: &'static str,
    exchange_info: &'static str,
    order: &'static str,
    leverage: Option<&'static str>,
    balance: &'static str,
    positions: Option<&'static str>,
}

const FUTURES: Endpoints = Endpoints {
    klines: "/fapi/v1/klines",
    ticker: "/fapi/v1/ticker/price",
    exchange_info: "/fapi/v1/exchangeInfo",
    order: "/fapi/v1/order",
    leverage: Some("/fapi/v1/leverage"),
    balance: "/fapi/v2/balance",
    positions: Some("/fapi/v2/positionRisk"),
};

const SPOT: Endpoints = Endpoints {
    klines: "/api/v3/klines",
    ticker: "/api/v3/ticker/price",
    exchange_info: "/api/v3/exchangeInfo",
    order: "/api/v3/order",
    leverage: None,
    balance: "/api/v3/account",
    positions: None,
};

/// A concrete implementation of the `ApiClient` for Binance USDⓈ-M futures and spot.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    mode: TradingMode,
    endpoints: Endpoints,
}

impl BinanceClient {
    pub fn new(mode: TradingMode, testnet: bool, keys: &ApiKeys) -> Result<Self, ApiError> {
        let base_url = match (mode, testnet) {
            (TradingMode::Futures, false) => "https://fapi.binance.com",
            (TradingMode::Futures, true) => "https://testnet.binancefuture.com",
            (TradingMode::Spot, false) => "https://api.binance.com",
            (TradingMode::Spot, true) => "https://testnet.binance.vision",
        };
        Self::with_base_url(mode, base_url, keys)
    }

    /// Points the client at an arbitrary host, e.g. a local mock.
    pub fn with_base_url(mode: TradingMode, base_url: &str, keys: &ApiKeys) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&keys.key).map_err(|e| ApiError::Config(format!("Invalid API key: {e}")))?,
        );

        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret: keys.secret.clone(),
            mode,
            endpoints: match mode {
                TradingMode::Futures => FUTURES,
                TradingMode::Spot => SPOT,
            },
        })
    }

    async fn send_public<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("recvWindow", RECV_WINDOW_MS.to_string());
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());

        let query_string = serde_qs::to_string(&params).map_err(|e| ApiError::Signing(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);

        let response = self.client.request(method, &url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()));
        }
        match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(api_error) => Err(ApiError::Exchange { code: api_error.code, msg: api_error.msg }),
            Err(_) => Err(ApiError::Http { status: status.as_u16(), body: text }),
        }
    }

    fn order_params(&self, order: &OrderRequest) -> Result<BTreeMap<&'static str, String>, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", to_exchange_id(&order.symbol));
        params.insert("side", order.side.as_str().to_string());
        params.insert("quantity", order.quantity.normalize().to_string());
        params.insert("newClientOrderId", order.client_order_id.simple().to_string());
        params.insert("newOrderRespType", "RESULT".to_string());

        match order.order_type {
            OrderType::Market => {
                params.insert("type", "MARKET".to_string());
            }
            OrderType::StopMarket => {
                let trigger = order
                    .trigger_price
                    .ok_or_else(|| ApiError::InvalidData("stop order without a trigger price".into()))?;
                let kind = match self.mode {
                    TradingMode::Futures => "STOP_MARKET",
                    TradingMode::Spot => "STOP_LOSS",
                };
                params.insert("type", kind.to_string());
                params.insert("stopPrice", trigger.normalize().to_string());
            }
        }
        if order.reduce_only && self.mode == TradingMode::Futures {
            params.insert("reduceOnly", "true".to_string());
        }
        Ok(params)
    }
}

#[async_trait]
impl ApiClient for BinanceClient {
    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<Kline>, ApiError> {
        let query = [
            ("symbol", to_exchange_id(symbol)),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<RawKline> = self.send_public(self.endpoints.klines, &query).await?;
        rows.into_iter().map(|raw| raw.into_kline(interval)).collect()
    }

    async fn get_ticker_price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        let query = [("symbol", to_exchange_id(symbol))];
        let ticker: TickerPrice = self.send_public(self.endpoints.ticker, &query).await?;
        Ok(ticker.price)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<(), ApiError> {
        let Some(path) = self.endpoints.leverage else {
            tracing::debug!(symbol, "Leverage does not apply to spot; skipping.");
            return Ok(());
        };
        let mut params = BTreeMap::new();
        params.insert("symbol", to_exchange_id(symbol));
        params.insert("leverage", leverage.to_string());
        self.send_signed::<serde_json::Value>(Method::POST, path, params).await?;
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        let params = self.order_params(order)?;
        tracing::debug!(?params, "Placing order");
        self.send_signed(Method::POST, self.endpoints.order, params).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", to_exchange_id(symbol));
        params.insert("orderId", order_id.to_string());
        self.send_signed::<serde_json::Value>(Method::DELETE, self.endpoints.order, params)
            .await?;
        Ok(())
    }

    async fn get_account_balance(&self) -> Result<Vec<BalanceResponse>, ApiError> {
        match self.mode {
            TradingMode::Futures => {
                self.send_signed(Method::GET, self.endpoints.balance, BTreeMap::new())
                    .await
            }
            TradingMode::Spot => {
                let account: SpotAccount = self
                    .send_signed(Method::GET, self.endpoints.balance, BTreeMap::new())
                    .await?;
                Ok(account.balances.into_iter().map(BalanceResponse::from).collect())
            }
        }
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError> {
        let Some(path) = self.endpoints.positions else {
            return Ok(Vec::new());
        };
        let positions: Vec<PositionResponse> = self.send_signed(Method::GET, path, BTreeMap::new()).await?;
        Ok(positions
            .into_iter()
            .map(ExchangePosition::from)
            .filter(|p| !p.is_flat())
            .collect())
    }

    async fn get_exchange_filters(&self) -> Result<HashMap<String, SymbolFilters>, ApiError> {
        let info: ExchangeInfo = self.send_public(self.endpoints.exchange_info, &[]).await?;
        Ok(info.into_filters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn client(mode: TradingMode) -> BinanceClient {
        let keys = ApiKeys { key: "key".into(), secret: "secret".into() };
        BinanceClient::new(mode, true, &keys).unwrap()
    }

    #[test]
    fn test_futures_stop_is_reduce_only_stop_market() {
        let order = OrderRequest::stop_market("BTC/USDT", OrderSide::Sell, dec!(0.010), dec!(64000.50));
        let params = client(TradingMode::Futures).order_params(&order).unwrap();
        assert_eq!(params["symbol"], "BTCUSDT");
        assert_eq!(params["type"], "STOP_MARKET");
        assert_eq!(params["stopPrice"], "64000.5");
        assert_eq!(params["quantity"], "0.01");
        assert_eq!(params["reduceOnly"], "true");
    }

    #[test]
    fn test_spot_orders_never_carry_reduce_only() {
        let order = OrderRequest::stop_market("ETH/USDT", OrderSide::Sell, dec!(0.5), dec!(2900));
        let params = client(TradingMode::Spot).order_params(&order).unwrap();
        assert_eq!(params["type"], "STOP_LOSS");
        assert!(!params.contains_key("reduceOnly"));
    }

    #[test]
    fn test_market_order_params() {
        let order = OrderRequest::market("SOL/USDT", OrderSide::Buy, dec!(3), false, dec!(150));
        let params = client(TradingMode::Futures).order_params(&order).unwrap();
        assert_eq!(params["type"], "MARKET");
        assert_eq!(params["side"], "BUY");
        assert!(!params.contains_key("stopPrice"));
        assert!(!params.contains_key("reduceOnly"));
    }

    #[test]
    fn test_stop_without_trigger_is_rejected() {
        let mut order = OrderRequest::stop_market("BTC/USDT", OrderSide::Sell, dec!(0.01), dec!(1));
        order.trigger_price = None;
        assert!(matches!(
            client(TradingMode::Futures).order_params(&order),
            Err(ApiError::InvalidData(_))
        ));
    }
}
