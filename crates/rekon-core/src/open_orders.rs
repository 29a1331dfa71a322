//! Local mirror of the orders live on a venue.
//!
//! Shaped like an [`OrderBook`] except that each price bucket holds every
//! live order at that price, keyed by venue id. Only confirmation callbacks
//! and snapshot refreshes mutate it; schedulers read it.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::warn;

use crate::orderbook::best_first;
use crate::{Amount, CoreError, Order, OrderBook, OrderId, OrderSide, Price, Result};

type Bucket = HashMap<OrderId, Order>;

/// Orders to create, correct or delete, per side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideDiff {
    pub buy: Vec<Order>,
    pub sell: Vec<Order>,
}

impl SideDiff {
    pub fn side(&self, side: OrderSide) -> &[Order] {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    fn side_mut(&mut self, side: OrderSide) -> &mut Vec<Order> {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

/// Structural diff between live orders and a desired book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDiff {
    /// Desired prices with no live bucket.
    pub create: SideDiff,
    /// Prices whose live total differs; each order carries the signed delta
    /// (desired minus live).
    pub update: SideDiff,
    /// Live orders whose price is absent from the desired side.
    pub delete: SideDiff,
}

impl OrderDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Live orders indexed by side, price and id.
#[derive(Debug, Clone)]
pub struct OpenOrders {
    market: String,
    buy: BTreeMap<Price, Bucket>,
    sell: BTreeMap<Price, Bucket>,
}

impl OpenOrders {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            buy: BTreeMap::new(),
            sell: BTreeMap::new(),
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    fn side_map(&self, side: OrderSide) -> &BTreeMap<Price, Bucket> {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    fn side_map_mut(&mut self, side: OrderSide) -> &mut BTreeMap<Price, Bucket> {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    /// Track a confirmed order. The order must carry its venue id.
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        let id = order
            .id
            .clone()
            .ok_or_else(|| CoreError::MissingOrderId(order.to_string()))?;
        self.side_map_mut(order.side)
            .entry(order.price)
            .or_default()
            .insert(id, order);
        Ok(())
    }

    /// Forget an order by id.
    ///
    /// The id is removed from every bucket on both sides; buckets left empty
    /// are pruned. Returns the removed order, if any was tracked.
    pub fn remove_order(&mut self, id: &OrderId) -> Option<Order> {
        let mut removed = None;
        for side in OrderSide::ALL {
            let map = self.side_map_mut(side);
            map.retain(|_, bucket| {
                if let Some(order) = bucket.remove(id) {
                    removed = Some(order);
                }
                !bucket.is_empty()
            });
        }
        removed
    }

    /// Replace the whole mirror with a venue snapshot.
    pub fn replace_with(&mut self, orders: impl IntoIterator<Item = Order>) {
        self.buy.clear();
        self.sell.clear();
        for order in orders {
            if order.market != self.market {
                continue;
            }
            if let Err(e) = self.add_order(order) {
                warn!(market = %self.market, error = %e, "Skipping snapshot order");
            }
        }
    }

    pub fn exists(&self, side: OrderSide, price: Price, id: &OrderId) -> bool {
        self.side_map(side)
            .get(&price)
            .is_some_and(|bucket| bucket.contains_key(id))
    }

    pub fn contains_price(&self, side: OrderSide, price: Price) -> bool {
        self.side_map(side).contains_key(&price)
    }

    /// Sum of live amounts at a price.
    pub fn price_amount(&self, side: OrderSide, price: Price) -> Amount {
        self.side_map(side)
            .get(&price)
            .map(|bucket| bucket.values().map(|o| o.amount).sum())
            .unwrap_or(Amount::ZERO)
    }

    /// Price buckets of a side, best price first. Orders inside a bucket are
    /// sorted by id so iteration is deterministic.
    pub fn buckets(&self, side: OrderSide) -> impl Iterator<Item = (Price, Vec<&Order>)> + '_ {
        best_first(self.side_map(side), side).map(|(price, bucket)| {
            let mut orders: Vec<&Order> = bucket.values().collect();
            orders.sort_by(|a, b| a.id.cmp(&b.id));
            (*price, orders)
        })
    }

    /// All live orders of a side, best price first.
    pub fn orders(&self, side: OrderSide) -> Vec<&Order> {
        self.buckets(side).flat_map(|(_, orders)| orders).collect()
    }

    pub fn best_price(&self, side: OrderSide) -> Option<Price> {
        best_first(self.side_map(side), side).next().map(|(p, _)| *p)
    }

    /// Total live amount on a side.
    pub fn volume(&self, side: OrderSide) -> Amount {
        self.side_map(side)
            .values()
            .flat_map(|bucket| bucket.values())
            .map(|o| o.amount)
            .sum()
    }

    /// Number of live orders across both sides.
    pub fn len(&self) -> usize {
        self.buy
            .values()
            .chain(self.sell.values())
            .map(|bucket| bucket.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }

    /// Aggregate live amounts into a plain book.
    pub fn to_orderbook(&self) -> OrderBook {
        let mut book = OrderBook::new(self.market.clone());
        for side in OrderSide::ALL {
            for (price, _) in best_first(self.side_map(side), side) {
                let amount = self.price_amount(side, *price);
                book.update(&Order::new(self.market.clone(), *price, amount, side));
            }
        }
        book
    }

    /// Diff live orders against a desired book.
    ///
    /// `precision` is the amount precision used to decide whether a new
    /// price is worth creating.
    pub fn get_diff(&self, desired: &OrderBook, precision: u32) -> OrderDiff {
        let mut diff = OrderDiff::default();

        for side in OrderSide::ALL {
            for (price, amount) in desired.levels(side) {
                if !self.contains_price(side, price) {
                    if amount.round_dp(precision).is_positive() {
                        diff.create
                            .side_mut(side)
                            .push(Order::new(self.market.clone(), price, amount, side));
                    }
                    continue;
                }

                let live = self.price_amount(side, price);
                if live != amount {
                    let delta = Amount::new(amount.inner() - live.inner());
                    diff.update
                        .side_mut(side)
                        .push(Order::new(self.market.clone(), price, delta, side));
                }
            }

            for order in self.orders(side) {
                if !desired.contains(order) {
                    diff.delete.side_mut(side).push(order.clone());
                }
            }
        }

        diff
    }

    /// Quote value locked by live orders on a side.
    pub fn locked_quote(&self, side: OrderSide) -> Decimal {
        self.side_map(side)
            .values()
            .flat_map(|bucket| bucket.values())
            .map(Order::notional)
            .sum()
    }
}
