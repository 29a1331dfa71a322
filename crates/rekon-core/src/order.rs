//! Order-related types and identifiers.
//!
//! Provides order side, order type, venue order id and the `Order` value
//! shared by order books, schedulers and venue adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, Price};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Both sides in scheduling order.
    pub const ALL: [OrderSide; 2] = [OrderSide::Buy, OrderSide::Sell];

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// True if `price` is better than `other` from this side's point of view
    /// (higher for buys, lower for sells).
    pub fn is_better(&self, price: Price, other: Price) -> bool {
        match self {
            Self::Buy => price > other,
            Self::Sell => price < other,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Limit order.
    #[default]
    Limit,
    /// Market order.
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Venue-assigned order id.
///
/// Venues hand out numeric or opaque string ids, so both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single order, desired or live.
///
/// Equality is structural over market, price, amount, side and type. The
/// venue id does not take part, so a confirmed order still equals the
/// intention it was created from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub market: String,
    pub price: Price,
    pub amount: Amount,
    pub side: OrderSide,
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
}

impl Order {
    /// Create a limit order without an id.
    pub fn new(market: impl Into<String>, price: Price, amount: Amount, side: OrderSide) -> Self {
        Self {
            market: market.into(),
            price,
            amount,
            side,
            order_type: OrderType::Limit,
            id: None,
        }
    }

    /// Attach a venue id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<OrderId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Quote-currency value of the order.
    pub fn notional(&self) -> rust_decimal::Decimal {
        self.amount.notional(self.price)
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.market == other.market
            && self.price == other.price
            && self.amount == other.amount
            && self.side == other.side
            && self.order_type == other.order_type
    }
}

impl Eq for Order {}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}@{}",
            self.market, self.order_type, self.side, self.amount, self.price
        )?;
        if let Some(id) = &self.id {
            write!(f, " #{id}")?;
        }
        Ok(())
    }
}
