//! Reconciliation runner: one strategy driving one target market.
//!
//! Each tick refreshes the source books, asks the strategy for a desired
//! book, schedules the difference against a snapshot of the live orders and
//! hands the resulting batch to the executor.
//!
//! The live-order mirror is only written by venue callbacks and by
//! [`Runner::refresh_open_orders`]; the scheduler reads a snapshot taken
//! under the lock and never awaits while holding it. Callbacks that land
//! while a refresh is in flight are journaled and replayed on top of the
//! fetched snapshot.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rekon_core::{OpenOrders, Order, OrderBook, OrderId, OrderSide, Price};
use rekon_executor::{ActionExecutor, DynExchange, Trade};
use rekon_scheduler::{
    Action, DestinationId, LadderParams, LadderScheduler, SchedulerError, SimpleScheduler, Target,
};
use rekon_telemetry::Metrics;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::{LadderConfig, SchedulerConfig};
use crate::error::{AppError, AppResult};
use crate::strategy::{Strategy, StrategyContext};

/// What a tick ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A batch of this many actions was pushed.
    Scheduled(usize),
    /// Live orders already match the desired book.
    Idle,
    /// The strategy declined to produce a book.
    Skipped,
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scheduled(_) => "scheduled",
            Self::Idle => "idle",
            Self::Skipped => "skipped",
        }
    }
}

/// A market on a venue.
#[derive(Clone)]
pub struct Source {
    pub exchange: DynExchange,
    pub market: String,
}

/// Rung boundaries for one side, starting at the best desired price and
/// moving away from the mid by `step` per rung.
pub fn ladder_boundaries(desired: &OrderBook, side: OrderSide, ladder: &LadderConfig) -> Vec<Price> {
    let Some(best) = desired.best_price(side) else {
        return Vec::new();
    };
    (0..ladder.levels)
        .map(|i| {
            let offset = ladder.step * Decimal::from(i);
            match side {
                OrderSide::Buy => best * (Decimal::ONE - offset),
                OrderSide::Sell => best * (Decimal::ONE + offset),
            }
        })
        .collect()
}

enum MirrorEvent {
    Created(Order),
    Deleted(OrderId),
}

/// Live orders plus the callbacks seen since the current refresh started.
struct Mirror {
    orders: OpenOrders,
    journal: Option<Vec<MirrorEvent>>,
}

impl Mirror {
    fn new(market: String) -> Self {
        Self {
            orders: OpenOrders::new(market),
            journal: None,
        }
    }

    fn created(&mut self, order: &Order) -> rekon_core::Result<()> {
        self.orders.add_order(order.clone())?;
        if let Some(journal) = self.journal.as_mut() {
            journal.push(MirrorEvent::Created(order.clone()));
        }
        Ok(())
    }

    fn deleted(&mut self, id: &OrderId) {
        self.orders.remove_order(id);
        if let Some(journal) = self.journal.as_mut() {
            journal.push(MirrorEvent::Deleted(id.clone()));
        }
    }

    fn begin_refresh(&mut self) {
        self.journal = Some(Vec::new());
    }

    fn abort_refresh(&mut self) {
        self.journal = None;
    }

    /// Install the snapshot, then replay what arrived while it was fetched.
    fn finish_refresh(&mut self, snapshot: Vec<Order>) {
        self.orders.replace_with(snapshot);
        for event in self.journal.take().unwrap_or_default() {
            match event {
                MirrorEvent::Created(order) => {
                    let _ = self.orders.add_order(order);
                }
                MirrorEvent::Deleted(id) => {
                    self.orders.remove_order(&id);
                }
            }
        }
    }
}

/// Drives one strategy against one target market.
pub struct Runner {
    id: String,
    strategy: Box<dyn Strategy>,
    target: Target,
    exchange: DynExchange,
    sources: Vec<Source>,
    scheduler: SchedulerConfig,
    open_orders: Arc<Mutex<Mirror>>,
    executor: Arc<ActionExecutor>,
}

impl Runner {
    /// Build a runner and wire the venue callbacks into its live-order
    /// mirror. The mirror starts from a fresh snapshot.
    pub async fn new(
        id: impl Into<String>,
        strategy: Box<dyn Strategy>,
        target: Source,
        sources: Vec<Source>,
        scheduler: SchedulerConfig,
        executor: Arc<ActionExecutor>,
    ) -> AppResult<Self> {
        let id = id.into();
        let market = target.exchange.market_config(&target.market).await?;
        let destination = DestinationId::new(target.exchange.id());
        let open_orders = Arc::new(Mutex::new(Mirror::new(market.id.clone())));

        let mirror = open_orders.clone();
        let market_id = market.id.clone();
        target
            .exchange
            .register_on_created_order(Arc::new(move |order: &Order| {
                if order.market != market_id {
                    return;
                }
                if let Err(e) = mirror.lock().created(order) {
                    warn!(error = %e, "Ignoring created order");
                }
            }));

        let mirror = open_orders.clone();
        let market_id = market.id.clone();
        target
            .exchange
            .register_on_deleted_order(Arc::new(move |order: &Order| {
                if order.market != market_id {
                    return;
                }
                if let Some(id) = &order.id {
                    mirror.lock().deleted(id);
                }
            }));

        let market_id = market.id.clone();
        let strategy_id = id.clone();
        target.exchange.register_on_trade_cb(Arc::new(move |trade: &Trade| {
            if trade.market == market_id {
                info!(
                    strategy = %strategy_id,
                    order_id = %trade.order_id,
                    side = %trade.side,
                    price = %trade.price,
                    amount = %trade.amount,
                    executed_at = %trade.executed_at,
                    "Trade"
                );
            }
        }));

        let runner = Self {
            id,
            strategy,
            target: Target::new(destination, market),
            exchange: target.exchange,
            sources,
            scheduler,
            open_orders,
            executor,
        };
        runner.refresh_open_orders().await?;
        info!(
            strategy = %runner.id,
            kind = runner.strategy.name(),
            destination = %runner.target.destination,
            market = %runner.target.market.id,
            "Runner ready"
        );
        Ok(runner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The executor this runner pushes to. Owned by this runner alone.
    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Copy of the live-order mirror.
    pub fn open_orders(&self) -> OpenOrders {
        self.open_orders.lock().orders.clone()
    }

    /// Replace the live-order mirror with a venue snapshot. Creates and
    /// deletes reported while the snapshot is in flight are reapplied.
    pub async fn refresh_open_orders(&self) -> AppResult<usize> {
        self.open_orders.lock().begin_refresh();
        let orders = match self.exchange.fetch_openorders(&self.target.market.id).await {
            Ok(orders) => orders,
            Err(e) => {
                self.open_orders.lock().abort_refresh();
                return Err(e.into());
            }
        };
        let count = {
            let mut mirror = self.open_orders.lock();
            mirror.finish_refresh(orders);
            mirror.orders.len()
        };
        Metrics::open_orders(
            self.target.destination.as_str(),
            &self.target.market.id,
            count,
        );
        debug!(strategy = %self.id, open_orders = count, "Refreshed open orders");
        Ok(count)
    }

    /// Run one reconciliation step. Records the outcome in metrics.
    pub async fn tick(&mut self) -> AppResult<TickOutcome> {
        let started = Instant::now();
        let result = self.reconcile().await;
        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        Metrics::tick(&self.id, outcome, started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn reconcile(&mut self) -> AppResult<TickOutcome> {
        let mut books = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            books.push(source.exchange.update_orderbook(&source.market).await?);
        }
        let balances = self.exchange.get_balances().await?;

        let mut ctx = StrategyContext::new(self.target.market.clone(), books, balances);
        let Some(desired) = self.strategy.call(&mut ctx) else {
            debug!(strategy = %self.id, "Strategy produced no book");
            return Ok(TickOutcome::Skipped);
        };
        for (label, value) in ctx.debug_artifacts() {
            debug!(strategy = %self.id, %label, %value, "Strategy artifact");
        }

        let snapshot = self.open_orders();
        Metrics::open_orders(
            self.target.destination.as_str(),
            &self.target.market.id,
            snapshot.len(),
        );
        let actions = self.schedule(&snapshot, &desired)?;
        if actions.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let creates = actions.iter().filter(|a| a.is_create()).count();
        Metrics::actions_scheduled(&self.id, "order_create", creates);
        Metrics::actions_scheduled(&self.id, "order_stop", actions.len() - creates);
        debug!(
            strategy = %self.id,
            creates,
            stops = actions.len() - creates,
            "Pushing batch"
        );

        let count = actions.len();
        self.executor.push(actions)?;
        Ok(TickOutcome::Scheduled(count))
    }

    fn schedule(&self, current: &OpenOrders, desired: &OrderBook) -> AppResult<Vec<Action>> {
        let actions = match &self.scheduler {
            SchedulerConfig::Simple => {
                SimpleScheduler::new().schedule(current, desired, &self.target)?
            }
            SchedulerConfig::Ladder(ladder) => {
                if desired.is_crossed() {
                    return Err(AppError::Scheduler(SchedulerError::InvalidOrderBook(
                        format!("desired book for {} is crossed", desired.market()),
                    )));
                }
                let aggregation = desired.aggregate(
                    &ladder_boundaries(desired, OrderSide::Buy, ladder),
                    &ladder_boundaries(desired, OrderSide::Sell, ladder),
                );
                let scheduler = LadderScheduler::new(LadderParams {
                    price_levels: aggregation.price_levels(),
                    max_amount_per_order: ladder.max_amount_per_order,
                });
                scheduler.schedule(current, &aggregation.book, &self.target)?
            }
        };
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_core::Amount;
    use rust_decimal_macros::dec;

    fn ladder(levels: usize, step: Decimal) -> LadderConfig {
        LadderConfig {
            levels,
            step,
            max_amount_per_order: None,
        }
    }

    #[test]
    fn test_ladder_boundaries_move_away_from_mid() {
        let desired = OrderBook::from_orders(
            "btcusd",
            [
                Order::new("btcusd", Price::new(dec!(100)), Amount::ONE, OrderSide::Buy),
                Order::new("btcusd", Price::new(dec!(110)), Amount::ONE, OrderSide::Sell),
            ],
        );
        let cfg = ladder(3, dec!(0.01));
        let bids: Vec<_> = ladder_boundaries(&desired, OrderSide::Buy, &cfg)
            .into_iter()
            .map(|p| p.0)
            .collect();
        let asks: Vec<_> = ladder_boundaries(&desired, OrderSide::Sell, &cfg)
            .into_iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(bids, vec![dec!(100), dec!(99), dec!(98)]);
        assert_eq!(asks, vec![dec!(110), dec!(111.1), dec!(112.2)]);
    }

    #[test]
    fn test_ladder_boundaries_empty_side() {
        let desired = OrderBook::new("btcusd");
        assert!(ladder_boundaries(&desired, OrderSide::Buy, &ladder(3, dec!(0.01))).is_empty());
    }

    #[test]
    fn test_tick_outcome_labels() {
        assert_eq!(TickOutcome::Scheduled(3).label(), "scheduled");
        assert_eq!(TickOutcome::Idle.label(), "idle");
        assert_eq!(TickOutcome::Skipped.label(), "skipped");
    }
}
