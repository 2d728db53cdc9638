use crate::error::ExecutorError;
use api_client::{ApiClient, RetryPolicy, with_retry};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Execution, OrderRequest, OrderType};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// The order operations a position needs over its lifetime.
///
/// This lets the lifecycle run unchanged against the exchange or against a
/// local paper book.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Sends a market order and returns the confirmed fill.
    async fn execute(&self, order: &OrderRequest) -> Result<Execution, ExecutorError>;

    /// Rests a stop order and returns its exchange order id.
    async fn place_stop(&self, order: &OrderRequest) -> Result<String, ExecutorError>;

    /// Cancels a resting order. An order that no longer exists counts as cancelled.
    async fn cancel(&self, symbol: &str, order_id: &str) -> Result<(), ExecutorError>;
}

/// The "live" executor that sends real orders to the exchange via the ApiClient.
///
/// Placements are sent once: a timed-out order may still have been accepted,
/// and repeating it could double the position. Cancels are retried.
pub struct LiveExecutor {
    api_client: Arc<dyn ApiClient>,
    retry: RetryPolicy,
}

impl LiveExecutor {
    pub fn new(api_client: Arc<dyn ApiClient>, retry: RetryPolicy) -> Self {
        Self { api_client, retry }
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    async fn execute(&self, order: &OrderRequest) -> Result<Execution, ExecutorError> {
        let response = self.api_client.place_order(order).await?;
        tracing::debug!(?response, "LiveExecutor: received order response");

        let quantity = if response.executed_qty > Decimal::ZERO {
            response.executed_qty
        } else {
            order.quantity
        };
        if response.status == "REJECTED" || response.status == "EXPIRED" {
            return Err(ExecutorError::Rejected(format!(
                "{} order {} ended as {}",
                order.symbol, response.order_id, response.status
            )));
        }

        Ok(Execution {
            order_id: response.order_id.to_string(),
            client_order_id: order.client_order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            price: response.fill_price().unwrap_or(order.reference_price),
            quantity,
            timestamp: Utc::now(),
        })
    }

    async fn place_stop(&self, order: &OrderRequest) -> Result<String, ExecutorError> {
        let response = self.api_client.place_order(order).await?;
        Ok(response.order_id.to_string())
    }

    async fn cancel(&self, symbol: &str, order_id: &str) -> Result<(), ExecutorError> {
        let result = with_retry(&self.retry, "cancel_order", || {
            self.api_client.cancel_order(symbol, order_id)
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_unknown_order() => {
                tracing::info!(symbol, order_id, "Order already gone; treating cancel as done.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Dry-run executor: fills market orders at their reference price and keeps
/// a local book of resting stops.
#[derive(Default)]
pub struct PaperExecutor {
    next_id: AtomicU64,
    submitted: Mutex<Vec<OrderRequest>>,
    resting: Mutex<Vec<(String, OrderRequest)>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn order_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Every order sent so far, oldest first.
    pub async fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().await.clone()
    }

    /// Stops currently resting in the paper book.
    pub async fn resting_stops(&self) -> Vec<(String, OrderRequest)> {
        self.resting.lock().await.clone()
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn execute(&self, order: &OrderRequest) -> Result<Execution, ExecutorError> {
        if order.quantity <= Decimal::ZERO {
            return Err(ExecutorError::InvalidQuantity {
                symbol: order.symbol.clone(),
                quantity: order.quantity,
            });
        }
        self.submitted.lock().await.push(order.clone());
        let execution = Execution {
            order_id: self.order_id(),
            client_order_id: order.client_order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.reference_price,
            quantity: order.quantity,
            timestamp: Utc::now(),
        };
        tracing::info!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            quantity = %order.quantity,
            price = %execution.price,
            "[DRY RUN] Simulated fill"
        );
        Ok(execution)
    }

    async fn place_stop(&self, order: &OrderRequest) -> Result<String, ExecutorError> {
        if order.order_type != OrderType::StopMarket || order.trigger_price.is_none() {
            return Err(ExecutorError::Rejected(format!(
                "{} is not a stop order",
                order.client_order_id
            )));
        }
        let id = self.order_id();
        self.submitted.lock().await.push(order.clone());
        self.resting.lock().await.push((id.clone(), order.clone()));
        Ok(id)
    }

    async fn cancel(&self, _symbol: &str, order_id: &str) -> Result<(), ExecutorError> {
        self.resting.lock().await.retain(|(id, _)| id != order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{BalanceResponse, OrderResponse};
    use core_types::{ExchangePosition, Kline, OrderSide, SymbolFilters};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Answers every order with a canned response and every cancel with a canned error.
    struct StubClient {
        order: OrderResponse,
        cancel_error: Option<i64>,
    }

    #[async_trait]
    impl ApiClient for StubClient {
        async fn fetch_klines(&self, _: &str, _: &str, _: u16) -> Result<Vec<Kline>, ApiError> {
            Ok(Vec::new())
        }
        async fn get_ticker_price(&self, _: &str) -> Result<Decimal, ApiError> {
            Ok(Decimal::ZERO)
        }
        async fn set_leverage(&self, _: &str, _: u8) -> Result<(), ApiError> {
            Ok(())
        }
        async fn place_order(&self, _: &OrderRequest) -> Result<OrderResponse, ApiError> {
            Ok(self.order.clone())
        }
        async fn cancel_order(&self, _: &str, _: &str) -> Result<(), ApiError> {
            match self.cancel_error {
                Some(code) => Err(ApiError::Exchange { code, msg: "cancel failed".into() }),
                None => Ok(()),
            }
        }
        async fn get_account_balance(&self) -> Result<Vec<BalanceResponse>, ApiError> {
            Ok(Vec::new())
        }
        async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError> {
            Ok(Vec::new())
        }
        async fn get_exchange_filters(&self) -> Result<HashMap<String, SymbolFilters>, ApiError> {
            Ok(HashMap::new())
        }
    }

    fn response(status: &str, avg_price: Decimal, executed: Decimal) -> OrderResponse {
        serde_json::from_value(serde_json::json!({
            "orderId": 42,
            "symbol": "BTCUSDT",
            "status": status,
            "avgPrice": avg_price.to_string(),
            "executedQty": executed.to_string(),
        }))
        .unwrap()
    }

    fn live(order: OrderResponse, cancel_error: Option<i64>) -> LiveExecutor {
        LiveExecutor::new(
            Arc::new(StubClient { order, cancel_error }),
            RetryPolicy { attempts: 2, delay: Duration::ZERO },
        )
    }

    #[tokio::test]
    async fn test_live_fill_uses_exchange_price() {
        let executor = live(response("FILLED", dec!(60123.4), dec!(0.01)), None);
        let order = OrderRequest::market("BTC/USDT", OrderSide::Buy, dec!(0.01), false, dec!(60000));
        let fill = executor.execute(&order).await.unwrap();
        assert_eq!(fill.price, dec!(60123.4));
        assert_eq!(fill.order_id, "42");
    }

    #[tokio::test]
    async fn test_live_rejection_is_an_error() {
        let executor = live(response("EXPIRED", dec!(0), dec!(0)), None);
        let order = OrderRequest::market("BTC/USDT", OrderSide::Sell, dec!(0.01), true, dec!(60000));
        assert!(matches!(executor.execute(&order).await, Err(ExecutorError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_cancel_of_unknown_order_succeeds() {
        let executor = live(response("NEW", dec!(0), dec!(0)), Some(-2011));
        assert!(executor.cancel("BTC/USDT", "7").await.is_ok());

        let executor = live(response("NEW", dec!(0), dec!(0)), Some(-2019));
        assert!(executor.cancel("BTC/USDT", "7").await.is_err());
    }

    #[tokio::test]
    async fn test_paper_book_tracks_resting_stops() {
        let paper = PaperExecutor::new();
        let stop = OrderRequest::stop_market("ETH/USDT", OrderSide::Sell, dec!(0.5), dec!(2900));
        let id = paper.place_stop(&stop).await.unwrap();
        assert_eq!(paper.resting_stops().await.len(), 1);
        paper.cancel("ETH/USDT", &id).await.unwrap();
        assert!(paper.resting_stops().await.is_empty());

        let market = OrderRequest::market("ETH/USDT", OrderSide::Sell, dec!(0.5), true, dec!(3000));
        assert!(paper.place_stop(&market).await.is_err());
    }
}
