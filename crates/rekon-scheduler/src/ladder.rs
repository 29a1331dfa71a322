//! Smart scheduler: prioritized cancels and a per-rung ladder.
//!
//! Live orders are compared against the desired book rung by rung, where a
//! rung is one [`PricePoint`] of the aggregated ladder. Three groups of
//! actions are produced, in this order:
//!
//! 1. Risky cancels: live orders that cross the desired opposite side.
//! 2. Out-of-bounds cancels: live orders deeper than the outer rung.
//! 3. Ladder actions: per-rung cancels of excess and creates for deficits.
//!
//! Each group is sorted by descending priority; priority classes never
//! overlap within a group.

use rekon_core::{Amount, OpenOrders, Order, OrderBook, OrderSide, Price, PriceLevels, PricePoint};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::action::{sort_by_priority, Action, ActionKind, Target};
use crate::error::Result;
use crate::simple::validate;

/// Base priority of cancels for orders crossing the desired book.
pub const CROSSING_PRIORITY_BASE: Decimal = dec!(1000000000);

/// Base priority of ladder rungs. Rung priorities fall in (1000, 2000].
pub const RUNG_PRIORITY_BASE: Decimal = dec!(1000);

/// Base priority of out-of-bounds cancels. These fall in [1, 2].
pub const OUT_OF_BOUNDS_PRIORITY_BASE: Decimal = Decimal::ONE;

/// `base + |boundary - price|`.
pub fn crossing_priority(price: Price, boundary: Price) -> Decimal {
    CROSSING_PRIORITY_BASE + price.distance(boundary)
}

/// `1000 * (1 + 1/(i+1))`: 2000 for the best rung, decreasing outward.
pub fn rung_priority(index: usize) -> Decimal {
    RUNG_PRIORITY_BASE * (Decimal::ONE + Decimal::ONE / Decimal::from(index + 1))
}

/// `1 + min(|price - boundary| / boundary, 1)`. Without a boundary the
/// maximum of the band is used.
pub fn out_of_bounds_priority(price: Price, boundary: Option<Price>) -> Decimal {
    let relative = match boundary {
        Some(b) if b.is_positive() => (price.distance(b) / b.inner()).min(Decimal::ONE),
        _ => Decimal::ONE,
    };
    OUT_OF_BOUNDS_PRIORITY_BASE + relative
}

/// Most creates a single rung deficit is split into. A smaller
/// `max_amount_per_order` is raised to `deficit / MAX_CHUNKS_PER_RUNG`.
pub const MAX_CHUNKS_PER_RUNG: usize = 64;

/// Split `amount` into chunks of at most `max`, and never more than
/// [`MAX_CHUNKS_PER_RUNG`] full chunks.
fn split_amount(amount: Amount, max: Option<Amount>) -> Vec<Amount> {
    let Some(max) = max.filter(Amount::is_positive) else {
        return vec![amount];
    };
    let max = max.max(amount / Decimal::from(MAX_CHUNKS_PER_RUNG));
    let mut chunks = Vec::new();
    let mut remaining = amount;
    while remaining.is_positive() {
        let chunk = remaining.min(max);
        chunks.push(chunk);
        remaining -= chunk;
    }
    chunks
}

/// True if a new order at `price` would trade against `opposite`.
fn would_cross(side: OrderSide, price: Price, opposite: Option<Price>) -> bool {
    match (side, opposite) {
        (OrderSide::Buy, Some(ask)) => price >= ask,
        (OrderSide::Sell, Some(bid)) => price <= bid,
        (_, None) => false,
    }
}

/// Parameters of the ladder scheduler.
#[derive(Debug, Clone, Default)]
pub struct LadderParams {
    /// Rungs per side, best first.
    pub price_levels: PriceLevels,
    /// Largest amount a single create may carry.
    pub max_amount_per_order: Option<Amount>,
}

/// Scheduler with priority classes and per-rung rebalancing.
#[derive(Debug, Clone)]
pub struct LadderScheduler {
    params: LadderParams,
}

impl LadderScheduler {
    pub fn new(params: LadderParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LadderParams {
        &self.params
    }

    /// Cancel live orders on the wrong side of `boundary`: buys above it,
    /// sells below it. An order exactly at the boundary is kept.
    pub fn cancel_risky_orders(
        &self,
        current: &OpenOrders,
        target: &Target,
        side: OrderSide,
        boundary: Price,
    ) -> Result<Vec<Action>> {
        current
            .orders(side)
            .into_iter()
            .filter(|order| side.is_better(order.price, boundary))
            .map(|order| {
                Action::stop(target.destination.clone(), order)
                    .map(|action| action.with_priority(crossing_priority(order.price, boundary)))
            })
            .collect()
    }

    /// Cancel live orders deeper than the outer rung: buys strictly below it,
    /// sells strictly above it. With no rung every order of the side goes.
    pub fn cancel_out_of_boundaries_orders(
        &self,
        current: &OpenOrders,
        target: &Target,
        side: OrderSide,
        boundary: Option<Price>,
    ) -> Result<Vec<Action>> {
        current
            .orders(side)
            .into_iter()
            .filter(|order| match boundary {
                Some(b) => side.is_better(b, order.price),
                None => true,
            })
            .map(|order| {
                Action::stop(target.destination.clone(), order).map(|action| {
                    action.with_priority(out_of_bounds_priority(order.price, boundary))
                })
            })
            .collect()
    }

    /// Rebalance each rung of one side.
    ///
    /// Rung `i` covers prices at or beyond its `price_point` and strictly
    /// inside the previous rung's `price_point`; the best rung is unbounded
    /// toward the mid. Excess live volume is cancelled deepest first until
    /// the rung holds no more than desired. A deficit is created at the
    /// rung's weighted price in chunks of at most `max_amount_per_order`,
    /// skipping creates that would cross `current_best_opposite_price`.
    pub fn adjust_levels(
        &self,
        current: &OpenOrders,
        desired: &OrderBook,
        target: &Target,
        side: OrderSide,
        price_points: &[PricePoint],
        current_best_opposite_price: Option<Price>,
    ) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        let mut inner: Option<Price> = None;

        for (index, rung) in price_points.iter().enumerate() {
            let outer = rung.price_point;
            let in_rung = |price: Price| {
                !side.is_better(outer, price) && inner.map_or(true, |i| side.is_better(i, price))
            };
            let priority = rung_priority(index);

            let wanted: Amount = desired
                .levels(side)
                .filter(|(price, _)| in_rung(*price))
                .map(|(_, amount)| amount)
                .sum();
            let live_orders: Vec<&Order> = current
                .orders(side)
                .into_iter()
                .filter(|order| in_rung(order.price))
                .collect();
            let mut live: Amount = live_orders.iter().map(|o| o.amount).sum();

            if live > wanted {
                for order in live_orders.iter().rev() {
                    if live <= wanted {
                        break;
                    }
                    actions.push(
                        Action::stop(target.destination.clone(), order)?.with_priority(priority),
                    );
                    live -= order.amount;
                }
            } else if wanted > live {
                let deficit = wanted - live;
                for chunk in split_amount(deficit, self.params.max_amount_per_order) {
                    let order =
                        Order::new(target.market.id.clone(), rung.weighted_price, chunk, side);
                    let Some(order) = target.market.normalize(&order) else {
                        continue;
                    };
                    if would_cross(side, order.price, current_best_opposite_price) {
                        debug!(
                            market = %target.market.id,
                            %side,
                            price = %order.price,
                            "Skipping create that would cross own orders"
                        );
                        continue;
                    }
                    actions.push(
                        Action::create(target.destination.clone(), order).with_priority(priority),
                    );
                }
            }

            inner = Some(outer);
        }

        Ok(actions)
    }

    /// Build the prioritized actions that move `current` to `desired`.
    pub fn schedule(
        &self,
        current: &OpenOrders,
        desired: &OrderBook,
        target: &Target,
    ) -> Result<Vec<Action>> {
        validate(current, desired, target)?;
        let levels = &self.params.price_levels;

        let mut risky = Vec::new();
        for side in OrderSide::ALL {
            if let Some(boundary) = desired.best_price(side.opposite()) {
                risky.extend(self.cancel_risky_orders(current, target, side, boundary)?);
            }
        }
        let mut remaining = current.clone();
        forget_stopped(&mut remaining, &risky);

        let mut out_of_bounds = Vec::new();
        for side in OrderSide::ALL {
            let outer = levels.side(side).last().map(|rung| rung.price_point);
            out_of_bounds.extend(self.cancel_out_of_boundaries_orders(
                &remaining, target, side, outer,
            )?);
        }
        forget_stopped(&mut remaining, &out_of_bounds);

        let mut ladder = Vec::new();
        for side in OrderSide::ALL {
            let opposite = remaining.best_price(side.opposite());
            ladder.extend(self.adjust_levels(
                &remaining,
                desired,
                target,
                side,
                levels.side(side),
                opposite,
            )?);
        }

        debug!(
            market = %target.market.id,
            destination = %target.destination,
            risky = risky.len(),
            out_of_bounds = out_of_bounds.len(),
            ladder = ladder.len(),
            "Scheduled ladder"
        );

        let mut actions = Vec::with_capacity(risky.len() + out_of_bounds.len() + ladder.len());
        for mut group in [risky, out_of_bounds, ladder] {
            sort_by_priority(&mut group);
            actions.extend(group);
        }
        Ok(actions)
    }
}

/// Drop the orders a group of stops already covers.
fn forget_stopped(orders: &mut OpenOrders, stops: &[Action]) {
    for action in stops {
        if let ActionKind::OrderStop { id, .. } = &action.kind {
            orders.remove_order(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_core::MarketConfig;

    fn target() -> Target {
        Target::new(
            "acc",
            MarketConfig {
                id: "btcusd".to_string(),
                base_unit: "btc".to_string(),
                quote_unit: "usd".to_string(),
                min_price: Price::ZERO,
                max_price: Price::ZERO,
                min_amount: Amount::ZERO,
                amount_precision: 8,
                price_precision: 8,
            },
        )
    }

    fn p(v: Decimal) -> Price {
        Price::new(v)
    }

    fn order(side: OrderSide, price: Decimal, amount: Decimal) -> Order {
        Order::new("btcusd", p(price), Amount::new(amount), side)
    }

    fn book(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> OrderBook {
        let orders = bids
            .iter()
            .map(|(pr, a)| order(OrderSide::Buy, *pr, *a))
            .chain(asks.iter().map(|(pr, a)| order(OrderSide::Sell, *pr, *a)));
        OrderBook::from_orders("btcusd", orders)
    }

    fn rungs(points: &[Decimal]) -> Vec<PricePoint> {
        points.iter().map(|v| PricePoint::new(p(*v), p(*v))).collect()
    }

    fn scheduler(bids: &[Decimal], asks: &[Decimal], max: Option<Decimal>) -> LadderScheduler {
        LadderScheduler::new(LadderParams {
            price_levels: PriceLevels {
                bids: rungs(bids),
                asks: rungs(asks),
            },
            max_amount_per_order: max.map(Amount::new),
        })
    }

    #[test]
    fn test_rung_priorities() {
        assert_eq!(rung_priority(0), dec!(2000));
        assert_eq!(rung_priority(1), dec!(1500));
        let third = rung_priority(2);
        assert!(third > dec!(1333.33) && third < dec!(1333.34));
        assert!(rung_priority(50) > RUNG_PRIORITY_BASE);
    }

    #[test]
    fn test_out_of_bounds_priority_band() {
        assert_eq!(out_of_bounds_priority(p(dec!(90)), Some(p(dec!(100)))), dec!(1.1));
        assert_eq!(out_of_bounds_priority(p(dec!(500)), Some(p(dec!(100)))), dec!(2));
        assert_eq!(out_of_bounds_priority(p(dec!(5)), None), dec!(2));
    }

    #[test]
    fn test_cancel_risky_orders_example() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Sell, dec!(2.0), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Sell, dec!(1.9), dec!(1)).with_id(2u64)).unwrap();

        let actions = scheduler(&[], &[], None)
            .cancel_risky_orders(&current, &target(), OrderSide::Sell, p(dec!(2.0)))
            .unwrap();

        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_stop());
        assert_eq!(actions[0].order().price.0, dec!(1.9));
        assert_eq!(actions[0].priority, Some(dec!(1000000000.1)));
    }

    #[test]
    fn test_cancel_risky_buy_orders() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(101), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(1)).with_id(2u64)).unwrap();

        let actions = scheduler(&[], &[], None)
            .cancel_risky_orders(&current, &target(), OrderSide::Buy, p(dec!(100)))
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].order().price.0, dec!(101));
    }

    #[test]
    fn test_cancel_out_of_boundaries_orders() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(95), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(90), dec!(1)).with_id(2u64)).unwrap();

        let actions = scheduler(&[], &[], None)
            .cancel_out_of_boundaries_orders(&current, &target(), OrderSide::Buy, Some(p(dec!(95))))
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].order().price.0, dec!(90));
        let priority = actions[0].priority.unwrap();
        assert!(priority > dec!(1) && priority < dec!(2));
    }

    #[test]
    fn test_adjust_levels_splits_creates() {
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(100), dec!(2.5))], &[]);
        let sched = scheduler(&[dec!(100)], &[], Some(dec!(1)));

        let actions = sched
            .adjust_levels(&current, &desired, &target(), OrderSide::Buy, &rungs(&[dec!(100)]), None)
            .unwrap();

        let amounts: Vec<_> = actions.iter().map(|a| a.order().amount.0).collect();
        assert_eq!(amounts, vec![dec!(1), dec!(1), dec!(0.5)]);
        assert!(actions.iter().all(|a| a.is_create() && a.priority == Some(dec!(2000))));
    }

    #[test]
    fn test_adjust_levels_cancels_excess_deepest_first() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(99.5), dec!(1)).with_id(2u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(97), dec!(1)).with_id(3u64)).unwrap();
        let desired = book(&[(dec!(99.8), dec!(1)), (dec!(97), dec!(1))], &[]);
        let points = rungs(&[dec!(99), dec!(96)]);

        let actions = scheduler(&[], &[], None)
            .adjust_levels(&current, &desired, &target(), OrderSide::Buy, &points, None)
            .unwrap();

        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_stop());
        assert_eq!(actions[0].order().id, Some(2u64.into()));
        assert_eq!(actions[0].priority, Some(dec!(2000)));
    }

    #[test]
    fn test_adjust_levels_skips_crossing_creates() {
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(100), dec!(1))], &[]);

        let actions = scheduler(&[], &[], None)
            .adjust_levels(
                &current,
                &desired,
                &target(),
                OrderSide::Buy,
                &rungs(&[dec!(100)]),
                Some(p(dec!(100))),
            )
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_schedule_orders_groups() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Sell, dec!(99.5), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(80), dec!(1)).with_id(2u64)).unwrap();
        let desired = book(&[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))]);

        let actions = scheduler(&[dec!(100)], &[dec!(101)], None)
            .schedule(&current, &desired, &target())
            .unwrap();

        assert_eq!(actions.len(), 4);
        assert!(actions[0].is_stop());
        assert_eq!(actions[0].order().price.0, dec!(99.5));
        assert_eq!(actions[0].priority, Some(dec!(1000000000.5)));
        assert!(actions[1].is_stop());
        assert_eq!(actions[1].order().price.0, dec!(80));
        assert_eq!(actions[1].priority, Some(dec!(1.2)));
        assert!(actions[2].is_create() && actions[2].order().side == OrderSide::Buy);
        assert!(actions[3].is_create() && actions[3].order().side == OrderSide::Sell);
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Sell, dec!(101), dec!(2)).with_id(2u64)).unwrap();
        let desired = book(&[(dec!(100), dec!(1))], &[(dec!(101), dec!(2))]);

        let actions = scheduler(&[dec!(100)], &[dec!(101)], None)
            .schedule(&current, &desired, &target())
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_schedule_rejects_crossed_book() {
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(102), dec!(1))], &[(dec!(101), dec!(1))]);
        assert!(scheduler(&[], &[], None)
            .schedule(&current, &desired, &target())
            .is_err());
    }

    #[test]
    fn test_split_amount() {
        let chunks = split_amount(Amount::new(dec!(3)), Some(Amount::new(dec!(1.5))));
        assert_eq!(chunks, vec![Amount::new(dec!(1.5)), Amount::new(dec!(1.5))]);
        assert_eq!(split_amount(Amount::new(dec!(3)), None).len(), 1);
        assert_eq!(split_amount(Amount::new(dec!(3)), Some(Amount::ZERO)).len(), 1);
    }

    #[test]
    fn test_split_amount_caps_chunk_count() {
        let chunks = split_amount(Amount::new(dec!(1000)), Some(Amount::new(dec!(0.00000001))));
        assert_eq!(chunks.len(), MAX_CHUNKS_PER_RUNG);
        assert!(chunks.iter().all(|c| *c == Amount::new(dec!(15.625))));
        assert_eq!(chunks.into_iter().sum::<Amount>(), Amount::new(dec!(1000)));

        // Non-terminating division still stops right after the cap.
        let chunks = split_amount(Amount::new(dec!(1)), Some(Amount::new(dec!(0.00000001))));
        assert!(chunks.len() <= MAX_CHUNKS_PER_RUNG + 1);
        assert_eq!(chunks.into_iter().sum::<Amount>(), Amount::ONE);
    }
}
