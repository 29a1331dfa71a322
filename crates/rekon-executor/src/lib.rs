//! Action execution for rekon.
//!
//! Delivers scheduled actions to trading venues, one lane per destination.
//!
//! # Key Components
//!
//! - [`Exchange`]: venue abstraction with lifecycle callbacks
//! - [`ActionExecutor`]: per-destination delayed queues with replace-on-push
//!   semantics and per-action tasks
//! - [`PaperExchange`]: in-memory venue for tests and dry runs

pub mod error;
pub mod exchange;
pub mod executor;
pub mod paper;

pub use error::{ExecutorError, ExecutorResult};
pub use exchange::{
    BoxFuture, DynExchange, Exchange, ExchangeError, ExchangeResult, OrderCallback,
    OrderResponse, Trade, TradeCallback,
};
pub use executor::{ActionExecutor, DEFAULT_DELAY};
pub use paper::{PaperCall, PaperExchange};
