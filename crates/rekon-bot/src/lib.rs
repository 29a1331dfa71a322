//! Order book reconciliation bot.
//!
//! Wires strategies, schedulers, venues and the action executor together:
//! - Configuration loading and validation
//! - Venue construction per account
//! - One reconciliation runner per strategy
//! - Graceful shutdown that drains in-flight actions

pub mod app;
pub mod config;
pub mod error;
pub mod exchanges;
pub mod runner;
pub mod strategy;

pub use app::Application;
pub use config::{AppConfig, SchedulerConfig, StrategyConfig};
pub use error::{AppError, AppResult};
pub use exchanges::ExchangeDriver;
pub use runner::{Runner, Source, TickOutcome};
pub use strategy::{Strategy, StrategyContext, StrategyKind};
