//! Executor error types.

use rekon_scheduler::DestinationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Unknown destination: {0}")]
    UnknownDestination(DestinationId),

    #[error("Destination already registered: {0}")]
    DuplicateDestination(DestinationId),

    #[error("Executor already started")]
    AlreadyStarted,

    #[error("Executor stopped")]
    Stopped,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
