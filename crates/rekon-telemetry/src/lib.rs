//! Prometheus metrics and structured logging for rekon.
//!
//! - Prometheus collectors for ticks, scheduled actions, executor dispatch
//!   and open orders, recorded through the `Metrics` facade
//! - Structured logging with tracing: JSON in production, pretty otherwise

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
pub use metrics::Metrics;
