//! Error types for rekon-scheduler.

use thiserror::Error;

/// Scheduling errors. All of them are defects in the inputs of a tick.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid order book: {0}")]
    InvalidOrderBook(String),

    #[error("Live order has no venue id: {0}")]
    MissingOrderId(String),

    #[error("Market mismatch: target {expected}, open orders {actual}")]
    MarketMismatch { expected: String, actual: String },
}

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
