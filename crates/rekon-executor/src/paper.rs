//! In-memory paper venue.
//!
//! Accepts orders, assigns sequential ids, locks balances and reports the
//! order lifecycle through the registered callbacks exactly like a live
//! adapter would. Calls are recorded and failures can be injected, which
//! makes it the venue of choice for tests and dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rekon_core::{Amount, Balance, MarketConfig, Order, OrderBook, OrderId, OrderSide};
use rust_decimal::Decimal;
use tracing::debug;

use crate::exchange::{
    BoxFuture, Exchange, ExchangeError, ExchangeResult, OrderCallback, OrderResponse, Trade,
    TradeCallback,
};

/// A call received by the paper venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperCall {
    CreateOrder(Order),
    StopOrder(OrderId),
}

#[derive(Default)]
struct Callbacks {
    created: Vec<OrderCallback>,
    deleted: Vec<OrderCallback>,
    trades: Vec<TradeCallback>,
}

#[derive(Debug, Default)]
struct PaperState {
    markets: HashMap<String, MarketConfig>,
    books: HashMap<String, OrderBook>,
    orders: BTreeMap<OrderId, Order>,
    /// Only currencies listed here are checked and locked.
    balances: HashMap<String, Balance>,
    next_id: u64,
    calls: Vec<PaperCall>,
    /// Errors returned by the next create/stop calls, in order.
    failures: VecDeque<String>,
    /// Status returned by every create while set.
    reject_status: Option<u16>,
}

impl PaperState {
    fn market(&self, market: &str) -> ExchangeResult<&MarketConfig> {
        self.markets
            .get(market)
            .ok_or_else(|| ExchangeError::UnknownMarket(market.to_string()))
    }

    /// Currency and amount an order locks while live.
    fn requirement(&self, order: &Order) -> ExchangeResult<(String, Decimal)> {
        let market = self.market(&order.market)?;
        Ok(match order.side {
            OrderSide::Buy => (market.quote_unit.clone(), order.notional()),
            OrderSide::Sell => (market.base_unit.clone(), order.amount.inner()),
        })
    }

    fn adjust_balance(&mut self, currency: &str, free_delta: Decimal, locked_delta: Decimal) {
        if let Some(balance) = self.balances.get_mut(currency) {
            *balance = Balance::new(
                currency,
                balance.free + free_delta,
                balance.locked + locked_delta,
            );
        }
    }
}

/// In-memory venue implementing [`Exchange`].
pub struct PaperExchange {
    id: String,
    latency: Option<Duration>,
    state: Mutex<PaperState>,
    callbacks: RwLock<Callbacks>,
}

impl PaperExchange {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latency: None,
            state: Mutex::new(PaperState {
                next_id: 1,
                ..PaperState::default()
            }),
            callbacks: RwLock::new(Callbacks::default()),
        }
    }

    /// Delay every create/stop by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn with_market(self, market: MarketConfig) -> Self {
        self.state.lock().markets.insert(market.id.clone(), market);
        self
    }

    #[must_use]
    pub fn with_balance(self, balance: Balance) -> Self {
        self.state
            .lock()
            .balances
            .insert(balance.currency.clone(), balance);
        self
    }

    #[must_use]
    pub fn with_orderbook(self, book: OrderBook) -> Self {
        self.set_orderbook(book);
        self
    }

    /// Replace the book served for a market.
    pub fn set_orderbook(&self, book: OrderBook) {
        self.state
            .lock()
            .books
            .insert(book.market().to_string(), book);
    }

    /// Make the next create/stop call fail with a request error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().failures.push_back(reason.into());
    }

    /// Reject every create with `status` until cleared with `None`.
    pub fn set_reject_status(&self, status: Option<u16>) {
        self.state.lock().reject_status = status;
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<PaperCall> {
        self.state.lock().calls.clone()
    }

    /// Live orders across all markets.
    pub fn open_orders(&self) -> Vec<Order> {
        self.state.lock().orders.values().cloned().collect()
    }

    pub fn balance(&self, currency: &str) -> Option<Balance> {
        self.state.lock().balances.get(currency).cloned()
    }

    /// Fill up to `amount` of a live order.
    ///
    /// Balances move from locked to the received currency. A partial fill is
    /// reported as a delete of the old order followed by a create of the
    /// remainder under the same id.
    pub fn fill_order(&self, id: &OrderId, amount: Amount) -> ExchangeResult<Trade> {
        let (trade, before, after) = {
            let mut state = self.state.lock();
            let order = state
                .orders
                .get(id)
                .cloned()
                .ok_or_else(|| ExchangeError::UnknownOrder(id.clone()))?;
            let market = state.market(&order.market)?.clone();

            let filled = amount.min(order.amount);
            let quote = filled.notional(order.price);
            match order.side {
                OrderSide::Buy => {
                    state.adjust_balance(&market.quote_unit, Decimal::ZERO, -quote);
                    state.adjust_balance(&market.base_unit, filled.inner(), Decimal::ZERO);
                }
                OrderSide::Sell => {
                    state.adjust_balance(&market.base_unit, Decimal::ZERO, -filled.inner());
                    state.adjust_balance(&market.quote_unit, quote, Decimal::ZERO);
                }
            }

            let remaining = order.amount - filled;
            let after = if remaining.is_positive() {
                let rest = Order {
                    amount: remaining,
                    ..order.clone()
                };
                state.orders.insert(id.clone(), rest.clone());
                Some(rest)
            } else {
                state.orders.remove(id);
                None
            };

            let trade = Trade {
                market: order.market.clone(),
                order_id: id.clone(),
                side: order.side,
                price: order.price,
                amount: filled,
                executed_at: Utc::now(),
            };
            (trade, order, after)
        };

        let callbacks = self.callbacks.read();
        for cb in &callbacks.trades {
            cb(&trade);
        }
        for cb in &callbacks.deleted {
            cb(&before);
        }
        if let Some(rest) = &after {
            for cb in &callbacks.created {
                cb(rest);
            }
        }
        Ok(trade)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn place(&self, order: Order) -> ExchangeResult<OrderResponse> {
        let placed = {
            let mut state = self.state.lock();
            state.calls.push(PaperCall::CreateOrder(order.clone()));

            if let Some(reason) = state.failures.pop_front() {
                return Err(ExchangeError::Request(reason));
            }
            if let Some(status) = state.reject_status {
                return Ok(OrderResponse::rejected(status));
            }

            let (currency, needed) = state.requirement(&order)?;
            if let Some(balance) = state.balances.get(&currency) {
                if balance.free < needed {
                    return Err(ExchangeError::InsufficientBalance {
                        currency,
                        needed,
                        available: balance.free,
                    });
                }
            }
            state.adjust_balance(&currency, -needed, needed);

            let id = OrderId::from(state.next_id);
            state.next_id += 1;
            let placed = order.with_id(id.clone());
            state.orders.insert(id, placed.clone());
            placed
        };

        debug!(exchange = %self.id, order = %placed, "Paper order created");
        for cb in &self.callbacks.read().created {
            cb(&placed);
        }
        Ok(OrderResponse {
            status: 200,
            id: placed.id,
        })
    }

    fn cancel(&self, id: OrderId) -> ExchangeResult<()> {
        let removed = {
            let mut state = self.state.lock();
            state.calls.push(PaperCall::StopOrder(id.clone()));

            if let Some(reason) = state.failures.pop_front() {
                return Err(ExchangeError::Request(reason));
            }

            let order = state
                .orders
                .remove(&id)
                .ok_or_else(|| ExchangeError::UnknownOrder(id.clone()))?;
            if let Ok((currency, locked)) = state.requirement(&order) {
                state.adjust_balance(&currency, locked, -locked);
            }
            order
        };

        debug!(exchange = %self.id, order = %removed, "Paper order deleted");
        for cb in &self.callbacks.read().deleted {
            cb(&removed);
        }
        Ok(())
    }
}

impl Exchange for PaperExchange {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_order(&self, order: Order) -> BoxFuture<'_, ExchangeResult<OrderResponse>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.place(order)
        })
    }

    fn stop_order(&self, id: OrderId) -> BoxFuture<'_, ExchangeResult<()>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.cancel(id)
        })
    }

    fn get_balances(&self) -> BoxFuture<'_, ExchangeResult<Vec<Balance>>> {
        Box::pin(async move {
            let mut balances: Vec<Balance> =
                self.state.lock().balances.values().cloned().collect();
            balances.sort_by(|a, b| a.currency.cmp(&b.currency));
            Ok(balances)
        })
    }

    fn market_config<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<MarketConfig>> {
        Box::pin(async move { self.state.lock().market(market).cloned() })
    }

    fn update_orderbook<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<OrderBook>> {
        Box::pin(async move {
            let state = self.state.lock();
            state.market(market)?;
            Ok(state
                .books
                .get(market)
                .cloned()
                .unwrap_or_else(|| OrderBook::new(market)))
        })
    }

    fn fetch_openorders<'a>(&'a self, market: &'a str) -> BoxFuture<'a, ExchangeResult<Vec<Order>>> {
        Box::pin(async move {
            // The snapshot is taken on arrival and delivered after the
            // simulated latency, like a response still on the wire.
            let orders: Vec<Order> = self
                .state
                .lock()
                .orders
                .values()
                .filter(|o| o.market == market)
                .cloned()
                .collect();
            self.simulate_latency().await;
            Ok(orders)
        })
    }

    fn register_on_created_order(&self, callback: OrderCallback) {
        self.callbacks.write().created.push(callback);
    }

    fn register_on_deleted_order(&self, callback: OrderCallback) {
        self.callbacks.write().deleted.push(callback);
    }

    fn register_on_trade_cb(&self, callback: TradeCallback) {
        self.callbacks.write().trades.push(callback);
    }
}
