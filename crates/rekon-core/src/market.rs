//! Market configuration and account balances.
//!
//! A `MarketConfig` carries the venue's precision and minimum-size rules.
//! Orders are normalized against it exactly once, right before they are
//! scheduled for creation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Amount, Order, Price};

/// Market specification from a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Market identifier (e.g. "btcusd").
    pub id: String,
    /// Base currency code.
    pub base_unit: String,
    /// Quote currency code.
    pub quote_unit: String,
    /// Lowest accepted price.
    #[serde(default)]
    pub min_price: Price,
    /// Highest accepted price. Zero disables the upper bound.
    #[serde(default)]
    pub max_price: Price,
    /// Smallest accepted order amount.
    #[serde(default)]
    pub min_amount: Amount,
    /// Decimal places accepted for amounts.
    pub amount_precision: u32,
    /// Decimal places accepted for prices.
    pub price_precision: u32,
}

impl MarketConfig {
    /// Apply precision and minimum-size rules to an order.
    ///
    /// Returns `None` when the order cannot be placed: non-positive price,
    /// price outside `[min_price, max_price]`, or amount that truncates to
    /// zero or below `min_amount`.
    pub fn normalize(&self, order: &Order) -> Option<Order> {
        let price = order.price.round_dp(self.price_precision);
        let amount = order.amount.truncate_dp(self.amount_precision);

        if !price.is_positive() || !amount.is_positive() {
            return None;
        }
        if price < self.min_price {
            return None;
        }
        if self.max_price.is_positive() && price > self.max_price {
            return None;
        }
        if amount < self.min_amount {
            return None;
        }

        Some(Order {
            price,
            amount,
            ..order.clone()
        })
    }
}

/// Balance of one currency on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

impl Balance {
    pub fn new(currency: impl Into<String>, free: Decimal, locked: Decimal) -> Self {
        Self {
            currency: currency.into(),
            free,
            locked,
            total: free + locked,
        }
    }
}
