//! Exchange registry: builds venue adapters from configuration.

use std::sync::Arc;
use std::time::Duration;

use rekon_core::{Amount, Balance, MarketConfig, Order, OrderBook, OrderSide, Price};
use rekon_executor::{DynExchange, PaperExchange};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Starting balance of a paper account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceConfig {
    pub currency: String,
    pub free: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

/// Order book served by a paper account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfig {
    pub market: String,
    /// `[price, amount]` pairs.
    #[serde(default)]
    pub bids: Vec<(Price, Amount)>,
    #[serde(default)]
    pub asks: Vec<(Price, Amount)>,
}

impl BookConfig {
    pub fn to_orderbook(&self) -> OrderBook {
        let orders = self
            .bids
            .iter()
            .map(|(p, a)| Order::new(self.market.clone(), *p, *a, OrderSide::Buy))
            .chain(
                self.asks
                    .iter()
                    .map(|(p, a)| Order::new(self.market.clone(), *p, *a, OrderSide::Sell)),
            );
        OrderBook::from_orders(self.market.clone(), orders)
    }
}

/// Settings of the in-memory paper venue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDriverConfig {
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub balances: Vec<BalanceConfig>,
    #[serde(default)]
    pub orderbooks: Vec<BookConfig>,
    /// Simulated round-trip per create/stop.
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// Venue driver selection, resolved once when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum ExchangeDriver {
    Paper(PaperDriverConfig),
}

impl ExchangeDriver {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Paper(_) => "paper",
        }
    }

    /// Markets the driver knows about before connecting, if any.
    pub fn markets(&self) -> Vec<&str> {
        match self {
            Self::Paper(cfg) => cfg.markets.iter().map(|m| m.id.as_str()).collect(),
        }
    }

    /// Market config known from configuration, if the driver carries one.
    pub fn market(&self, id: &str) -> Option<&MarketConfig> {
        match self {
            Self::Paper(cfg) => cfg.markets.iter().find(|m| m.id == id),
        }
    }

    pub fn validate(&self, account: &str) -> AppResult<()> {
        match self {
            Self::Paper(cfg) => {
                for book in &cfg.orderbooks {
                    if !cfg.markets.iter().any(|m| m.id == book.market) {
                        return Err(AppError::Config(format!(
                            "account {account}: order book for unknown market {}",
                            book.market
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Build the adapter for account `id`.
    pub fn build(&self, id: &str) -> AppResult<DynExchange> {
        self.validate(id)?;
        match self {
            Self::Paper(cfg) => {
                let mut paper = PaperExchange::new(id);
                if let Some(ms) = cfg.latency_ms {
                    paper = paper.with_latency(Duration::from_millis(ms));
                }
                for market in &cfg.markets {
                    paper = paper.with_market(market.clone());
                }
                for balance in &cfg.balances {
                    paper = paper.with_balance(Balance::new(
                        balance.currency.clone(),
                        balance.free,
                        balance.locked,
                    ));
                }
                for book in &cfg.orderbooks {
                    paper.set_orderbook(book.to_orderbook());
                }
                Ok(Arc::new(paper))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_executor::Exchange;

    const PAPER: &str = r#"
        driver = "paper"
        latency_ms = 5

        [[markets]]
        id = "btcusd"
        base_unit = "btc"
        quote_unit = "usd"
        amount_precision = 4
        price_precision = 2

        [[balances]]
        currency = "usd"
        free = "1000"

        [[orderbooks]]
        market = "btcusd"
        bids = [["99.5", "1"], ["99", "2"]]
        asks = [["100.5", "1"]]
    "#;

    #[tokio::test]
    async fn test_build_paper_driver() {
        let driver: ExchangeDriver = toml::from_str(PAPER).unwrap();
        assert_eq!(driver.name(), "paper");
        assert_eq!(driver.markets(), vec!["btcusd"]);

        let exchange = driver.build("paper-1").unwrap();
        assert_eq!(exchange.id(), "paper-1");
        let book = exchange.update_orderbook("btcusd").await.unwrap();
        assert_eq!(book.depth(OrderSide::Buy), 2);
        assert_eq!(book.depth(OrderSide::Sell), 1);
        assert_eq!(exchange.get_balances().await.unwrap()[0].total, Decimal::from(1000));
    }

    #[test]
    fn test_book_for_unknown_market_rejected() {
        let driver = ExchangeDriver::Paper(PaperDriverConfig {
            orderbooks: vec![BookConfig {
                market: "ethusd".to_string(),
                bids: Vec::new(),
                asks: Vec::new(),
            }],
            ..PaperDriverConfig::default()
        });
        assert!(matches!(driver.build("x"), Err(AppError::Config(_))));
    }
}
