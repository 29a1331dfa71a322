//! Core domain types for the rekon market-making engine.
//!
//! This crate provides the values every other crate trades in:
//! - `Price`, `Amount`: precision-safe numeric types
//! - `Order`, `OrderSide`, `OrderId`: single orders and their identity
//! - `OrderBook`: price-indexed volume per side, with aggregation and
//!   volume-shaping transforms
//! - `OpenOrders`: the local mirror of live venue orders and its diff
//!   against a desired book
//! - `MarketConfig`, `Balance`: venue rules and account balances

pub mod decimal;
pub mod error;
pub mod market;
pub mod open_orders;
pub mod order;
pub mod orderbook;

pub use decimal::{Amount, Price};
pub use error::{CoreError, Result};
pub use market::{Balance, MarketConfig};
pub use open_orders::{OpenOrders, OrderDiff, SideDiff};
pub use order::{Order, OrderId, OrderSide, OrderType};
pub use orderbook::{
    AggregatedLevel, Aggregation, BookSnapshot, OrderBook, PriceLevels, PricePoint, PRICE_SCALE,
};
