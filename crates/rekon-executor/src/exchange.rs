//! Venue abstraction.
//!
//! Provides a trait-based abstraction over a trading venue so that the
//! executor and the reconciliation driver can run against real adapters
//! or the in-memory [`PaperExchange`](crate::paper::PaperExchange).
//!
//! Methods return boxed futures to stay dyn-compatible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rekon_core::{Amount, Balance, MarketConfig, Order, OrderBook, OrderId, OrderSide, Price};
use thiserror::Error;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Venue errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("Insufficient {currency} balance: need {needed}, free {available}")]
    InsufficientBalance {
        currency: String,
        needed: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Venue reply to an order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResponse {
    /// HTTP-like status. Anything at or above 300 is a rejection.
    pub status: u16,
    /// Id assigned by the venue, when accepted.
    pub id: Option<OrderId>,
}

impl OrderResponse {
    pub fn accepted(id: OrderId) -> Self {
        Self {
            status: 200,
            id: Some(id),
        }
    }

    pub fn rejected(status: u16) -> Self {
        Self { status, id: None }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status < 300
    }
}

/// A fill against one of our orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub market: String,
    pub order_id: OrderId,
    pub side: OrderSide,
    pub price: Price,
    pub amount: Amount,
    pub executed_at: DateTime<Utc>,
}

/// Callback fired when an order is confirmed created or deleted.
pub type OrderCallback = Arc<dyn Fn(&Order) + Send + Sync>;

/// Callback fired on each trade.
pub type TradeCallback = Arc<dyn Fn(&Trade) + Send + Sync>;

/// A trading venue.
///
/// Implementations report order lifecycle through the registered callbacks:
/// created-order callbacks fire once the venue has assigned an id, and
/// deleted-order callbacks fire once the order is gone.
pub trait Exchange: Send + Sync {
    /// Account identifier, used in logs.
    fn id(&self) -> &str;

    /// Place an order.
    fn create_order(&self, order: Order) -> BoxFuture<'_, ExchangeResult<OrderResponse>>;

    /// Cancel an order by venue id.
    fn stop_order(&self, id: OrderId) -> BoxFuture<'_, ExchangeResult<()>>;

    /// Current balances of the account.
    fn get_balances(&self) -> BoxFuture<'_, ExchangeResult<Vec<Balance>>>;

    /// Precision and size rules of a market.
    fn market_config<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<MarketConfig>>;

    /// Fresh order book of a market.
    fn update_orderbook<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<OrderBook>>;

    /// Snapshot of our live orders on a market.
    fn fetch_openorders<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<Vec<Order>>>;

    fn register_on_created_order(&self, callback: OrderCallback);

    fn register_on_deleted_order(&self, callback: OrderCallback);

    fn register_on_trade_cb(&self, callback: TradeCallback);
}

/// Type alias for a shared venue.
pub type DynExchange = Arc<dyn Exchange>;
