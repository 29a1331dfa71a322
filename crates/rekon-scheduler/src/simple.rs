//! Simple scheduler: cancel what differs, then weave creates between stops.
//!
//! Creates are released only once enough volume has been cancelled to pay
//! for them, so the account never has to hold old and new orders at the
//! same time.

use rekon_core::{OpenOrders, Order, OrderBook, OrderSide};
use rust_decimal::Decimal;
use tracing::debug;

use crate::action::{Action, Target};
use crate::error::{Result, SchedulerError};

/// Reject inputs that no schedule can be built from.
pub(crate) fn validate(current: &OpenOrders, desired: &OrderBook, target: &Target) -> Result<()> {
    for market in [current.market(), desired.market()] {
        if market != target.market.id {
            return Err(SchedulerError::MarketMismatch {
                expected: target.market.id.clone(),
                actual: market.to_string(),
            });
        }
    }
    if desired.is_crossed() {
        return Err(SchedulerError::InvalidOrderBook(format!(
            "desired book for {} is crossed: bid {:?} >= ask {:?}",
            desired.market(),
            desired.best_price(OrderSide::Buy),
            desired.best_price(OrderSide::Sell),
        )));
    }
    Ok(())
}

/// Interleave creates between stops.
///
/// Each stop adds its amount to a running balance; following creates are
/// released in order while their amount fits the balance. Once the stops
/// run out, the remaining creates follow unconditionally.
pub fn weave(stops: Vec<Action>, creates: Vec<Action>) -> Vec<Action> {
    let mut out = Vec::with_capacity(stops.len() + creates.len());
    let mut balance = Decimal::ZERO;
    let mut creates = creates.into_iter().peekable();

    for stop in stops {
        balance += stop.order().amount.inner();
        out.push(stop);

        while let Some(next) = creates.peek() {
            let amount = next.order().amount.inner();
            if amount > balance {
                break;
            }
            balance -= amount;
            out.extend(creates.next());
        }
    }

    out.extend(creates);
    out
}

/// Scheduler without priority classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleScheduler;

impl SimpleScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Build the actions that move `current` to `desired`.
    ///
    /// Output is the buy-side weave followed by the sell-side weave. Buckets
    /// whose live total already matches the desired amount are left alone.
    pub fn schedule(
        &self,
        current: &OpenOrders,
        desired: &OrderBook,
        target: &Target,
    ) -> Result<Vec<Action>> {
        validate(current, desired, target)?;

        let mut actions = Vec::new();
        for side in OrderSide::ALL {
            let stops = self.stops(current, desired, target, side)?;
            let creates = self.creates(current, desired, target, side);
            debug!(
                market = %target.market.id,
                destination = %target.destination,
                %side,
                stops = stops.len(),
                creates = creates.len(),
                "Scheduled side"
            );
            actions.extend(weave(stops, creates));
        }
        Ok(actions)
    }

    /// One stop per live order in every bucket whose total differs from the
    /// desired amount at that price.
    fn stops(
        &self,
        current: &OpenOrders,
        desired: &OrderBook,
        target: &Target,
        side: OrderSide,
    ) -> Result<Vec<Action>> {
        let mut stops = Vec::new();
        for (price, orders) in current.buckets(side) {
            let live = current.price_amount(side, price);
            if desired.amount_at(side, price) == Some(live) {
                continue;
            }
            for order in orders {
                stops.push(Action::stop(target.destination.clone(), order)?);
            }
        }
        Ok(stops)
    }

    /// Normalized creates for every desired price not satisfied by live
    /// orders. Orders the market rules reject are skipped.
    fn creates(
        &self,
        current: &OpenOrders,
        desired: &OrderBook,
        target: &Target,
        side: OrderSide,
    ) -> Vec<Action> {
        desired
            .levels(side)
            .filter(|(price, amount)| {
                !current.contains_price(side, *price)
                    || current.price_amount(side, *price) != *amount
            })
            .filter_map(|(price, amount)| {
                let order = Order::new(target.market.id.clone(), price, amount, side);
                target.market.normalize(&order)
            })
            .map(|order| Action::create(target.destination.clone(), order))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_core::{Amount, MarketConfig, Price};
    use rust_decimal_macros::dec;

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

    fn order(side: OrderSide, price: Decimal, amount: Decimal) -> Order {
        Order::new("btcusd", Price::new(price), Amount::new(amount), side)
    }

    fn book(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> OrderBook {
        let orders = bids
            .iter()
            .map(|(p, a)| order(OrderSide::Buy, *p, *a))
            .chain(asks.iter().map(|(p, a)| order(OrderSide::Sell, *p, *a)));
        OrderBook::from_orders("btcusd", orders)
    }

    fn stop(price: Decimal, amount: Decimal, id: u64) -> Action {
        Action::stop(
            "acc".into(),
            &order(OrderSide::Buy, price, amount).with_id(id),
        )
        .unwrap()
    }

    fn create(price: Decimal, amount: Decimal) -> Action {
        Action::create("acc".into(), order(OrderSide::Buy, price, amount))
    }

    /// Running created amount never exceeds running cancelled amount while
    /// stops remain.
    fn assert_weave_invariant(actions: &[Action], total_stops: usize) {
        let mut cancelled = Decimal::ZERO;
        let mut created = Decimal::ZERO;
        let mut stops_seen = 0;
        for action in actions {
            if action.is_stop() {
                cancelled += action.order().amount.inner();
                stops_seen += 1;
            } else {
                created += action.order().amount.inner();
                if stops_seen < total_stops {
                    assert!(created <= cancelled, "create released before funds: {action}");
                }
            }
        }
    }

    #[test]
    fn test_empty_current_creates_both_sides() {
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(1), dec!(1))], &[(dec!(1.1), dec!(1))]);

        let actions = SimpleScheduler::new().schedule(&current, &desired, &target()).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(Action::is_create));
        assert_eq!(actions[0].order().side, OrderSide::Buy);
        assert_eq!(actions[1].order().side, OrderSide::Sell);
    }

    #[test]
    fn test_matching_state_is_idempotent() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(1)).with_id(1u64)).unwrap();
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(2)).with_id(2u64)).unwrap();
        current.add_order(order(OrderSide::Sell, dec!(101), dec!(1)).with_id(3u64)).unwrap();
        let desired = book(&[(dec!(100), dec!(3))], &[(dec!(101), dec!(1))]);

        let actions = SimpleScheduler::new().schedule(&current, &desired, &target()).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_mismatched_bucket_is_replaced() {
        let mut current = OpenOrders::new("btcusd");
        current.add_order(order(OrderSide::Buy, dec!(100), dec!(30)).with_id(1u64)).unwrap();
        let desired = book(&[(dec!(100), dec!(40))], &[]);

        let actions = SimpleScheduler::new().schedule(&current, &desired, &target()).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions[0].is_stop());
        assert!(actions[1].is_create());
        assert_eq!(actions[1].order().amount.0, dec!(40));
    }

    #[test]
    fn test_crossed_desired_book_is_rejected() {
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(101), dec!(1))], &[(dec!(100), dec!(1))]);
        let err = SimpleScheduler::new().schedule(&current, &desired, &target()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidOrderBook(_)));
    }

    #[test]
    fn test_market_mismatch_is_rejected() {
        let current = OpenOrders::new("ethusd");
        let desired = book(&[], &[]);
        let err = SimpleScheduler::new().schedule(&current, &desired, &target()).unwrap_err();
        assert!(matches!(err, SchedulerError::MarketMismatch { .. }));
    }

    #[test]
    fn test_creates_are_normalized_and_filtered() {
        let mut t = target();
        t.market.amount_precision = 2;
        t.market.price_precision = 1;
        let current = OpenOrders::new("btcusd");
        let desired = book(&[(dec!(99.96), dec!(1.239)), (dec!(99), dec!(0.001))], &[]);

        let actions = SimpleScheduler::new().schedule(&current, &desired, &t).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].order().price.0, dec!(100));
        assert_eq!(actions[0].order().amount.0, dec!(1.23));
    }

    #[test]
    fn test_weave_releases_creates_as_funds_free_up() {
        let stops = vec![stop(dec!(10), dec!(1), 1), stop(dec!(11), dec!(2), 2)];
        let creates = vec![create(dec!(12), dec!(2)), create(dec!(13), dec!(1))];

        let woven = weave(stops, creates);
        let labels: Vec<_> = woven
            .iter()
            .map(|a| (a.is_stop(), a.order().price.0))
            .collect();
        assert_eq!(
            labels,
            vec![
                (true, dec!(10)),
                (true, dec!(11)),
                (false, dec!(12)),
                (false, dec!(13)),
            ]
        );
        assert_weave_invariant(&woven, 2);
    }

    #[test]
    fn test_weave_blocks_on_first_create_that_does_not_fit() {
        let stops = vec![stop(dec!(10), dec!(1), 1), stop(dec!(11), dec!(1), 2)];
        let creates = vec![create(dec!(12), dec!(5)), create(dec!(13), dec!(0.5))];

        let woven = weave(stops, creates);
        // The large create blocks the small one until the stops run out.
        assert!(woven[0].is_stop());
        assert!(woven[1].is_stop());
        assert_eq!(woven[2].order().price.0, dec!(12));
        assert_eq!(woven[3].order().price.0, dec!(13));
    }

    #[test]
    fn test_weave_invariant_on_mixed_sizes() {
        let stops: Vec<_> = (1..=5u64)
            .map(|i| stop(Decimal::from(i), Decimal::from(i), i))
            .collect();
        let creates: Vec<_> = [dec!(0.5), dec!(2), dec!(2), dec!(4), dec!(7)]
            .into_iter()
            .enumerate()
            .map(|(i, a)| create(Decimal::from(100 + i as u64), a))
            .collect();

        let woven = weave(stops, creates);
        assert_eq!(woven.len(), 10);
        assert_weave_invariant(&woven, 5);
    }

    #[test]
    fn test_weave_without_stops_emits_creates() {
        let woven = weave(Vec::new(), vec![create(dec!(1), dec!(1))]);
        assert_eq!(woven.len(), 1);
    }
}
