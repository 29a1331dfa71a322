//! Price-indexed order book.
//!
//! Each side maps `price → amount`, bids iterated from the highest price and
//! asks from the lowest. Transforms (`aggregate`, `adjust_volume`, `spread`)
//! return new books; only `update` and `delete` mutate in place, which is how
//! feed-driven caches are kept current.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Amount, Order, OrderSide, Price};

/// Decimal places kept for prices derived by transforms (spread, weighted
/// level prices).
pub const PRICE_SCALE: u32 = 16;

/// Iterate a side's map from the best price outward.
pub(crate) fn best_first<V>(
    map: &BTreeMap<Price, V>,
    side: OrderSide,
) -> Box<dyn Iterator<Item = (&Price, &V)> + '_> {
    match side {
        OrderSide::Buy => Box::new(map.iter().rev()),
        OrderSide::Sell => Box::new(map.iter()),
    }
}

/// Lazily computed aggregate volumes.
///
/// Values can be seeded at construction (venue snapshots sometimes carry
/// them) and are otherwise computed on first access. Any mutation resets
/// the cache.
#[derive(Debug, Clone, Default)]
struct VolumeCache {
    bids_base: OnceCell<Amount>,
    asks_base: OnceCell<Amount>,
    bids_quote: OnceCell<Decimal>,
    asks_quote: OnceCell<Decimal>,
}

/// Ordered, price-indexed volume map per side.
#[derive(Debug, Clone)]
pub struct OrderBook {
    market: String,
    buy: BTreeMap<Price, Amount>,
    sell: BTreeMap<Price, Amount>,
    volumes: VolumeCache,
}

impl PartialEq for OrderBook {
    fn eq(&self, other: &Self) -> bool {
        self.market == other.market && self.buy == other.buy && self.sell == other.sell
    }
}

impl Eq for OrderBook {}

/// Ladder rung handed to the smart scheduler: the boundary price of the
/// level and the price at which liquidity for that level is quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price_point: Price,
    pub weighted_price: Price,
}

impl PricePoint {
    pub fn new(price_point: Price, weighted_price: Price) -> Self {
        Self {
            price_point,
            weighted_price,
        }
    }
}

/// Ladder rungs for both sides, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub bids: Vec<PricePoint>,
    pub asks: Vec<PricePoint>,
}

impl PriceLevels {
    pub fn side(&self, side: OrderSide) -> &[PricePoint] {
        match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        }
    }
}

/// One bucket produced by [`OrderBook::aggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLevel {
    /// Effective boundary of the level after any shift.
    pub price_point: Price,
    pub volume: Amount,
    pub high_price: Price,
    pub low_price: Price,
    /// Volume-weighted average price of the bucket.
    pub weighted_price: Price,
}

/// Result of [`OrderBook::aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Book keyed by each level's weighted price.
    pub book: OrderBook,
    pub bids: Vec<AggregatedLevel>,
    pub asks: Vec<AggregatedLevel>,
}

impl Aggregation {
    /// Ladder rungs derived from the aggregated levels.
    pub fn price_levels(&self) -> PriceLevels {
        let to_points = |levels: &[AggregatedLevel]| {
            levels
                .iter()
                .map(|l| PricePoint::new(l.price_point, l.weighted_price))
                .collect()
        };
        PriceLevels {
            bids: to_points(&self.bids),
            asks: to_points(&self.asks),
        }
    }
}

/// Serializable view of a book, used for debug artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub market: String,
    pub bids: Vec<(Price, Amount)>,
    pub asks: Vec<(Price, Amount)>,
}

#[derive(Debug)]
struct LevelAccumulator {
    volume: Amount,
    quote: Decimal,
    high: Price,
    low: Price,
}

impl LevelAccumulator {
    fn new(price: Price, amount: Amount) -> Self {
        Self {
            volume: amount,
            quote: amount.notional(price),
            high: price,
            low: price,
        }
    }

    fn add(&mut self, price: Price, amount: Amount) {
        self.volume += amount;
        self.quote += amount.notional(price);
        self.high = self.high.max(price);
        self.low = self.low.min(price);
    }

    fn finish(self, price_point: Price) -> AggregatedLevel {
        let weighted = Price::new(self.quote / self.volume.inner()).round_dp(PRICE_SCALE);
        AggregatedLevel {
            price_point,
            volume: self.volume,
            high_price: self.high,
            low_price: self.low,
            weighted_price: weighted,
        }
    }
}

impl OrderBook {
    /// Create an empty book for a market.
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            buy: BTreeMap::new(),
            sell: BTreeMap::new(),
            volumes: VolumeCache::default(),
        }
    }

    /// Build a book from orders; later orders at the same price win.
    pub fn from_orders(market: impl Into<String>, orders: impl IntoIterator<Item = Order>) -> Self {
        let mut book = Self::new(market);
        for order in orders {
            book.update(&order);
        }
        book
    }

    /// Seed known aggregate volumes. Unknown ones stay lazy.
    #[must_use]
    pub fn with_volumes(
        self,
        bids_base: Option<Amount>,
        asks_base: Option<Amount>,
        bids_quote: Option<Decimal>,
        asks_quote: Option<Decimal>,
    ) -> Self {
        if let Some(v) = bids_base {
            let _ = self.volumes.bids_base.set(v);
        }
        if let Some(v) = asks_base {
            let _ = self.volumes.asks_base.set(v);
        }
        if let Some(v) = bids_quote {
            let _ = self.volumes.bids_quote.set(v);
        }
        if let Some(v) = asks_quote {
            let _ = self.volumes.asks_quote.set(v);
        }
        self
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    fn side_map(&self, side: OrderSide) -> &BTreeMap<Price, Amount> {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    fn side_map_mut(&mut self, side: OrderSide) -> &mut BTreeMap<Price, Amount> {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    /// Upsert the amount at the order's price. A non-positive amount removes
    /// the entry.
    pub fn update(&mut self, order: &Order) {
        let map = self.side_map_mut(order.side);
        if order.amount.is_positive() {
            map.insert(order.price, order.amount);
        } else {
            map.remove(&order.price);
        }
        self.volumes = VolumeCache::default();
    }

    /// Remove the entry at the order's price.
    pub fn delete(&mut self, order: &Order) {
        self.side_map_mut(order.side).remove(&order.price);
        self.volumes = VolumeCache::default();
    }

    /// True if the order's side has an entry at the order's price.
    pub fn contains(&self, order: &Order) -> bool {
        self.contains_price(order.side, order.price)
    }

    pub fn contains_price(&self, side: OrderSide, price: Price) -> bool {
        self.side_map(side).contains_key(&price)
    }

    pub fn amount_at(&self, side: OrderSide, price: Price) -> Option<Amount> {
        self.side_map(side).get(&price).copied()
    }

    /// Entries of one side, best price first.
    pub fn levels(&self, side: OrderSide) -> impl Iterator<Item = (Price, Amount)> + '_ {
        best_first(self.side_map(side), side).map(|(p, a)| (*p, *a))
    }

    pub fn best_price(&self, side: OrderSide) -> Option<Price> {
        self.levels(side).next().map(|(p, _)| p)
    }

    /// Number of price entries on a side.
    pub fn depth(&self, side: OrderSide) -> usize {
        self.side_map(side).len()
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }

    /// True if the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.best_price(OrderSide::Buy), self.best_price(OrderSide::Sell)) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn volume_bids_base(&self) -> Amount {
        *self
            .volumes
            .bids_base
            .get_or_init(|| self.buy.values().sum())
    }

    pub fn volume_asks_base(&self) -> Amount {
        *self
            .volumes
            .asks_base
            .get_or_init(|| self.sell.values().sum())
    }

    pub fn volume_bids_quote(&self) -> Decimal {
        *self
            .volumes
            .bids_quote
            .get_or_init(|| self.buy.iter().map(|(p, a)| a.notional(*p)).sum())
    }

    pub fn volume_asks_quote(&self) -> Decimal {
        *self
            .volumes
            .asks_quote
            .get_or_init(|| self.sell.iter().map(|(p, a)| a.notional(*p)).sum())
    }

    pub fn volume_base(&self, side: OrderSide) -> Amount {
        match side {
            OrderSide::Buy => self.volume_bids_base(),
            OrderSide::Sell => self.volume_asks_base(),
        }
    }

    pub fn volume_quote(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.volume_bids_quote(),
            OrderSide::Sell => self.volume_asks_quote(),
        }
    }

    /// Bucket price points into the given levels.
    ///
    /// Boundaries are listed best first. A buy entry belongs to the first
    /// level whose boundary it is at or above (sell: at or below). When an
    /// entry falls past the boundary of a level that is still empty, that
    /// boundary and every later one move toward the book by the same
    /// distance, so no empty level is emitted and the level count holds.
    /// Entries past the last boundary are ignored.
    pub fn aggregate(&self, levels_buy: &[Price], levels_sell: &[Price]) -> Aggregation {
        let bids = self.aggregate_side(OrderSide::Buy, levels_buy);
        let asks = self.aggregate_side(OrderSide::Sell, levels_sell);

        let mut book = OrderBook::new(self.market.clone());
        for (side, levels) in [(OrderSide::Buy, &bids), (OrderSide::Sell, &asks)] {
            let map = book.side_map_mut(side);
            for level in levels {
                *map.entry(level.weighted_price).or_default() += level.volume;
            }
        }

        Aggregation { book, bids, asks }
    }

    fn aggregate_side(&self, side: OrderSide, boundaries: &[Price]) -> Vec<AggregatedLevel> {
        let within = |price: Price, boundary: Price| match side {
            OrderSide::Buy => price >= boundary,
            OrderSide::Sell => price <= boundary,
        };

        let mut levels = Vec::with_capacity(boundaries.len());
        let mut shift = Decimal::ZERO;
        let mut idx = 0;
        let mut current: Option<LevelAccumulator> = None;

        'entries: for (price, amount) in self.levels(side) {
            loop {
                let Some(base) = boundaries.get(idx) else {
                    break 'entries;
                };
                let boundary = Price::new(base.inner() + shift);

                if within(price, boundary) {
                    match current.as_mut() {
                        Some(acc) => acc.add(price, amount),
                        None => current = Some(LevelAccumulator::new(price, amount)),
                    }
                    break;
                }

                match current.take() {
                    Some(acc) => {
                        levels.push(acc.finish(boundary));
                        idx += 1;
                    }
                    None => shift += price.inner() - boundary.inner(),
                }
            }
        }

        if let (Some(acc), Some(base)) = (current, boundaries.get(idx)) {
            levels.push(acc.finish(Price::new(base.inner() + shift)));
        }

        levels
    }

    /// Scale volume down to the given caps.
    ///
    /// Per side, if the base volume exceeds its cap every amount is scaled by
    /// `cap / volume`, walking from the best price outward. Then, once the
    /// cumulative quote volume would exceed the quote cap, the level that
    /// crosses it is truncated to the remaining budget and deeper levels are
    /// dropped. Caps at or above the current volume leave the side as is.
    pub fn adjust_volume(
        &self,
        limit_bids_base: Amount,
        limit_asks_base: Amount,
        limit_bids_quote: Option<Decimal>,
        limit_asks_quote: Option<Decimal>,
    ) -> OrderBook {
        OrderBook {
            market: self.market.clone(),
            buy: self.adjust_side_volume(OrderSide::Buy, limit_bids_base, limit_bids_quote),
            sell: self.adjust_side_volume(OrderSide::Sell, limit_asks_base, limit_asks_quote),
            volumes: VolumeCache::default(),
        }
    }

    fn adjust_side_volume(
        &self,
        side: OrderSide,
        limit_base: Amount,
        limit_quote: Option<Decimal>,
    ) -> BTreeMap<Price, Amount> {
        let volume = self.volume_base(side);
        let ratio = if volume > limit_base && volume.is_positive() {
            limit_base.inner().max(Decimal::ZERO) / volume.inner()
        } else {
            Decimal::ONE
        };

        let mut out = BTreeMap::new();
        let mut spent_quote = Decimal::ZERO;

        for (price, amount) in self.levels(side) {
            let mut amount = amount * ratio;
            if !amount.is_positive() {
                continue;
            }

            let quote = amount.notional(price);
            if let Some(cap) = limit_quote {
                if spent_quote + quote > cap {
                    let remaining = cap - spent_quote;
                    if remaining > Decimal::ZERO {
                        amount = Amount::new(remaining / price.inner());
                        out.insert(price, amount);
                    }
                    break;
                }
            }

            spent_quote += quote;
            out.insert(price, amount);
        }

        out
    }

    /// Shift prices away from the mid.
    ///
    /// Buy prices are multiplied by `1 - bids_spread` and sell prices by
    /// `1 + asks_spread`, rounded to [`PRICE_SCALE`]. Entries that collapse
    /// onto the same price are merged.
    pub fn spread(&self, bids_spread: Decimal, asks_spread: Decimal) -> OrderBook {
        let shift = |map: &BTreeMap<Price, Amount>, factor: Decimal| {
            let mut out: BTreeMap<Price, Amount> = BTreeMap::new();
            for (price, amount) in map {
                let shifted = (*price * factor).round_dp(PRICE_SCALE);
                *out.entry(shifted).or_default() += *amount;
            }
            out
        };

        let book = OrderBook {
            market: self.market.clone(),
            buy: shift(&self.buy, Decimal::ONE - bids_spread),
            sell: shift(&self.sell, Decimal::ONE + asks_spread),
            volumes: VolumeCache::default(),
        };

        // Base volumes do not change; quote volumes are recomputed on access.
        let bids_base = self.volumes.bids_base.get().copied();
        let asks_base = self.volumes.asks_base.get().copied();
        book.with_volumes(bids_base, asks_base, None, None)
    }

    /// Serializable copy of the book.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            market: self.market.clone(),
            bids: self.levels(OrderSide::Buy).collect(),
            asks: self.levels(OrderSide::Sell).collect(),
        }
    }
}
