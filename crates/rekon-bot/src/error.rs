//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] rekon_core::CoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] rekon_scheduler::SchedulerError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] rekon_executor::ExchangeError),

    #[error("Executor error: {0}")]
    Executor(#[from] rekon_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] rekon_telemetry::TelemetryError),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
