//! Reconciliation loop integration tests.
//!
//! Drives a runner against the paper venue through the real executor:
//! - A first tick places the desired book
//! - Once the venue has answered, the next tick has nothing to do
//! - Fills are picked up from venue callbacks and replaced

mod integration;
use integration::common::{fixed_strategy, ladder, Harness, DELAY};

use rekon_bot::config::SchedulerConfig;
use rekon_bot::TickOutcome;
use rekon_core::{Amount, OrderSide, Price};
use rekon_executor::{PaperCall, PaperExchange};
use rust_decimal_macros::dec;

#[tokio::test(start_paused = true)]
async fn test_simple_converges_after_one_batch() {
    let mut h = Harness::new(SchedulerConfig::Simple).await;

    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Scheduled(2));
    assert!(h.paper.open_orders().is_empty());

    h.settle().await;
    assert_eq!(h.paper.open_orders().len(), 2);
    assert_eq!(h.runner.open_orders().len(), 2);

    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_newer_batch_replaces_queued_one() {
    let mut h = Harness::new(SchedulerConfig::Simple).await;

    h.runner.tick().await.unwrap();
    h.runner.tick().await.unwrap();
    h.settle().await;

    // Only one batch reached the venue.
    let creates = h
        .paper
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PaperCall::CreateOrder(_)))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test(start_paused = true)]
async fn test_partial_fill_is_replaced() {
    let mut h = Harness::new(SchedulerConfig::Simple).await;
    h.runner.tick().await.unwrap();
    h.settle().await;

    let bid = h
        .paper
        .open_orders()
        .into_iter()
        .find(|o| o.side == OrderSide::Buy)
        .unwrap();
    h.paper
        .fill_order(bid.id.as_ref().unwrap(), Amount::new(dec!(0.2)))
        .unwrap();

    let mirror = h.runner.open_orders();
    assert_eq!(
        mirror.price_amount(OrderSide::Buy, Price::new(dec!(99))),
        Amount::new(dec!(0.3))
    );

    // The partial bucket is replaced as a whole: one stop, one create.
    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Scheduled(2));
    h.settle().await;
    assert_eq!(
        h.runner
            .open_orders()
            .price_amount(OrderSide::Buy, Price::new(dec!(99))),
        Amount::new(dec!(0.5))
    );
    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_ladder_splits_and_converges() {
    let mut h = Harness::new(ladder()).await;

    // 0.5 per side in chunks of at most 0.2.
    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Scheduled(6));
    h.settle().await;

    let orders = h.paper.open_orders();
    assert_eq!(orders.len(), 6);
    assert!(orders.iter().all(|o| o.amount <= Amount::new(dec!(0.2))));

    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_multi_rung_ladder_converges() {
    let mut h = Harness::build(PaperExchange::new("paper"), fixed_strategy(3), ladder()).await;

    // Three rungs per side, 0.5 each, in chunks of 0.2, 0.2 and 0.1.
    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Scheduled(18));
    h.settle().await;

    let mirror = h.runner.open_orders();
    for (side, prices) in [
        (OrderSide::Buy, [dec!(99), dec!(98), dec!(97)]),
        (OrderSide::Sell, [dec!(101), dec!(102), dec!(103)]),
    ] {
        for price in prices {
            assert_eq!(
                mirror.price_amount(side, Price::new(price)),
                Amount::new(dec!(0.5)),
                "{side} {price}"
            );
        }
    }
    assert_eq!(mirror.len(), 18);

    assert_eq!(h.runner.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_fill_during_refresh_survives_snapshot() {
    let paper = PaperExchange::new("paper").with_latency(DELAY);
    let mut h = Harness::build(paper, fixed_strategy(1), SchedulerConfig::Simple).await;
    h.runner.tick().await.unwrap();
    // Drain plus the venue round trip.
    h.settle().await;
    h.settle().await;
    assert_eq!(h.runner.open_orders().len(), 2);

    let bid = h
        .paper
        .open_orders()
        .into_iter()
        .find(|o| o.side == OrderSide::Buy)
        .unwrap();
    let id = bid.id.clone().unwrap();

    // The snapshot is taken before the fill and delivered after it.
    let (refreshed, filled) = tokio::join!(h.runner.refresh_open_orders(), async {
        tokio::time::sleep(DELAY / 2).await;
        h.paper.fill_order(&id, Amount::new(dec!(0.2)))
    });
    refreshed.unwrap();
    filled.unwrap();

    assert_eq!(
        h.runner
            .open_orders()
            .price_amount(OrderSide::Buy, Price::new(dec!(99))),
        Amount::new(dec!(0.3))
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_matches_venue() {
    let mut h = Harness::new(SchedulerConfig::Simple).await;
    assert_eq!(h.runner.refresh_open_orders().await.unwrap(), 0);

    h.runner.tick().await.unwrap();
    h.settle().await;
    assert_eq!(h.runner.refresh_open_orders().await.unwrap(), 2);
    assert_eq!(h.runner.open_orders().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_refuses_new_batches() {
    let mut h = Harness::new(SchedulerConfig::Simple).await;
    h.executor.shutdown().await;
    assert!(h.runner.tick().await.is_err());
    assert!(h.paper.calls().is_empty());
}
