//! Paper venue fixtures.

use std::sync::Arc;
use std::time::Duration;

use rekon_bot::config::{LadderConfig, SchedulerConfig};
use rekon_bot::strategy::{FixedPriceParams, FixedPriceStrategy};
use rekon_bot::{Runner, Source};
use rekon_core::{Amount, MarketConfig, Price};
use rekon_executor::{ActionExecutor, DynExchange, PaperExchange};
use rekon_scheduler::DestinationId;
use rust_decimal_macros::dec;

pub const DELAY: Duration = Duration::from_millis(200);

pub fn btcusd() -> MarketConfig {
    MarketConfig {
        id: "btcusd".to_string(),
        base_unit: "btc".to_string(),
        quote_unit: "usd".to_string(),
        min_price: Price::default(),
        max_price: Price::default(),
        min_amount: Amount::default(),
        amount_precision: 4,
        price_precision: 2,
    }
}

/// `levels` bids from 99 down and asks from 101 up, one point apart,
/// 0.5 each.
pub fn fixed_strategy(levels: usize) -> Box<FixedPriceStrategy> {
    Box::new(FixedPriceStrategy::new(FixedPriceParams {
        mid: Price::new(dec!(100)),
        spread: dec!(0.01),
        levels,
        step: dec!(0.01),
        amount: Amount::new(dec!(0.5)),
    }))
}

pub fn ladder() -> SchedulerConfig {
    SchedulerConfig::Ladder(LadderConfig {
        levels: 3,
        step: dec!(0.01),
        max_amount_per_order: Some(Amount::new(dec!(0.2))),
    })
}

pub struct Harness {
    pub paper: Arc<PaperExchange>,
    pub executor: Arc<ActionExecutor>,
    pub runner: Runner,
}

impl Harness {
    /// One-level fixed-price strategy on an instant paper venue.
    pub async fn new(scheduler: SchedulerConfig) -> Self {
        Self::build(PaperExchange::new("paper"), fixed_strategy(1), scheduler).await
    }

    pub async fn build(
        paper: PaperExchange,
        strategy: Box<FixedPriceStrategy>,
        scheduler: SchedulerConfig,
    ) -> Self {
        let paper = Arc::new(paper.with_market(btcusd()));
        let exchange: DynExchange = paper.clone();

        let executor = Arc::new(ActionExecutor::new());
        executor
            .register(DestinationId::new("paper"), exchange.clone(), Some(DELAY))
            .unwrap();
        executor.start().unwrap();

        let runner = Runner::new(
            "fixed",
            strategy,
            Source {
                exchange,
                market: "btcusd".to_string(),
            },
            Vec::new(),
            scheduler,
            executor.clone(),
        )
        .await
        .unwrap();

        Self {
            paper,
            executor,
            runner,
        }
    }

    /// Let the executor dispatch the queued batch and the venue answer.
    pub async fn settle(&self) {
        tokio::time::sleep(DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
    }
}
