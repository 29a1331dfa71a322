//! Strategies: functions from market data to a desired order book.
//!
//! A strategy only decides *what* the book should look like. Diffing it
//! against live orders and sequencing the changes is the scheduler's job.

use rekon_core::{Amount, Balance, MarketConfig, Order, OrderBook, OrderSide, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inputs of one strategy call.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    /// Rules of the market the desired book is for.
    pub market: MarketConfig,
    /// Source books, in configuration order.
    pub sources: Vec<OrderBook>,
    /// Balances of the target account.
    pub balances: Vec<Balance>,
    debug: Vec<(String, Value)>,
}

impl StrategyContext {
    pub fn new(market: MarketConfig, sources: Vec<OrderBook>, balances: Vec<Balance>) -> Self {
        Self {
            market,
            sources,
            balances,
            debug: Vec::new(),
        }
    }

    /// Total balance of a currency, zero when the account has none.
    pub fn balance_total(&self, currency: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.currency == currency)
            .map(|b| b.total)
            .unwrap_or(Decimal::ZERO)
    }

    /// Publish an inspection artifact. Values that fail to serialize are
    /// recorded as their error message.
    pub fn push_debug(&mut self, label: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or_else(|e| Value::String(e.to_string()));
        self.debug.push((label.into(), value));
    }

    pub fn debug_artifacts(&self) -> &[(String, Value)] {
        &self.debug
    }
}

/// A pluggable pricing strategy.
pub trait Strategy: Send + Sync {
    /// Registry name of the strategy.
    fn name(&self) -> &'static str;

    /// Compute the desired book, or `None` to leave live orders untouched
    /// this tick.
    fn call(&mut self, ctx: &mut StrategyContext) -> Option<OrderBook>;
}

/// Re-key a book onto `market`, applying its precision rules and merging
/// entries that collapse onto the same price.
pub fn quantize(book: &OrderBook, market: &MarketConfig) -> OrderBook {
    let mut out = OrderBook::new(market.id.clone());
    for side in OrderSide::ALL {
        for (price, amount) in book.levels(side) {
            let order = Order::new(market.id.clone(), price, amount, side);
            let Some(order) = market.normalize(&order) else {
                continue;
            };
            let merged = out.amount_at(side, order.price).unwrap_or(Amount::ZERO) + order.amount;
            out.update(&Order {
                amount: merged,
                ..order
            });
        }
    }
    out
}

// ============================================================================
// copy
// ============================================================================

/// Parameters of the `copy` strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyParams {
    /// Relative distance added below source bids.
    #[serde(default)]
    pub bids_spread: Decimal,
    /// Relative distance added above source asks.
    #[serde(default)]
    pub asks_spread: Decimal,
    /// Base volume cap for bids. Defaults to nothing beyond the quote cap.
    #[serde(default)]
    pub limit_bids_base: Option<Amount>,
    /// Base volume cap for asks. Defaults to the base balance.
    #[serde(default)]
    pub limit_asks_base: Option<Amount>,
    /// Quote volume cap for bids. Defaults to the quote balance.
    #[serde(default)]
    pub limit_bids_quote: Option<Decimal>,
    #[serde(default)]
    pub limit_asks_quote: Option<Decimal>,
}

/// Mirror the first source book with a spread, within volume limits.
#[derive(Debug, Clone)]
pub struct CopyStrategy {
    params: CopyParams,
}

impl CopyStrategy {
    pub fn new(params: CopyParams) -> Self {
        Self { params }
    }
}

impl Strategy for CopyStrategy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn call(&mut self, ctx: &mut StrategyContext) -> Option<OrderBook> {
        let source = ctx.sources.first()?.clone();
        if source.is_empty() {
            return None;
        }

        let p = &self.params;
        let limit_bids_base = p.limit_bids_base.unwrap_or(source.volume_bids_base());
        let limit_asks_base = p
            .limit_asks_base
            .unwrap_or_else(|| Amount::new(ctx.balance_total(&ctx.market.base_unit)));
        let limit_bids_quote = p
            .limit_bids_quote
            .or_else(|| Some(ctx.balance_total(&ctx.market.quote_unit)));

        let spread = source.spread(p.bids_spread, p.asks_spread);
        let adjusted = spread.adjust_volume(
            limit_bids_base,
            limit_asks_base,
            limit_bids_quote,
            p.limit_asks_quote,
        );
        let desired = quantize(&adjusted, &ctx.market);

        ctx.push_debug("source", source.snapshot());
        ctx.push_debug("spread", spread.snapshot());
        ctx.push_debug("desired", desired.snapshot());
        Some(desired)
    }
}

// ============================================================================
// fixedprice
// ============================================================================

/// Parameters of the `fixedprice` strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPriceParams {
    /// Center of the ladder.
    pub mid: Price,
    /// Relative distance of the first level from the mid.
    pub spread: Decimal,
    /// Levels per side.
    #[serde(default = "default_levels")]
    pub levels: usize,
    /// Relative distance between levels.
    #[serde(default)]
    pub step: Decimal,
    /// Amount per level.
    pub amount: Amount,
}

fn default_levels() -> usize {
    1
}

/// Symmetric ladder around a fixed mid price.
#[derive(Debug, Clone)]
pub struct FixedPriceStrategy {
    params: FixedPriceParams,
}

impl FixedPriceStrategy {
    pub fn new(params: FixedPriceParams) -> Self {
        Self { params }
    }
}

impl Strategy for FixedPriceStrategy {
    fn name(&self) -> &'static str {
        "fixedprice"
    }

    fn call(&mut self, ctx: &mut StrategyContext) -> Option<OrderBook> {
        let p = &self.params;
        let mut book = OrderBook::new(ctx.market.id.clone());
        for i in 0..p.levels {
            let offset = p.spread + p.step * Decimal::from(i);
            let bid = p.mid * (Decimal::ONE - offset);
            let ask = p.mid * (Decimal::ONE + offset);
            book.update(&Order::new(ctx.market.id.clone(), bid, p.amount, OrderSide::Buy));
            book.update(&Order::new(ctx.market.id.clone(), ask, p.amount, OrderSide::Sell));
        }

        let desired = quantize(&book, &ctx.market);
        ctx.push_debug("desired", desired.snapshot());
        Some(desired)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Strategy selection, resolved once when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StrategyKind {
    Copy(CopyParams),
    Fixedprice(FixedPriceParams),
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Copy(_) => "copy",
            Self::Fixedprice(_) => "fixedprice",
        }
    }

    /// Minimum number of sources the strategy reads.
    pub fn required_sources(&self) -> usize {
        match self {
            Self::Copy(_) => 1,
            Self::Fixedprice(_) => 0,
        }
    }

    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            Self::Copy(params) => Box::new(CopyStrategy::new(params.clone())),
            Self::Fixedprice(params) => Box::new(FixedPriceStrategy::new(params.clone())),
        }
    }
}
