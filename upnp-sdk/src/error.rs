use gena::GenaError;
use thiserror::Error;
use threadutil::{ThreadPoolError, TimerError};

use crate::logging::LoggingError;

/// Errors surfaced by [`UpnpContext`](crate::UpnpContext) and its configuration
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Thread pool error: {0}")]
    Pool(#[from] ThreadPoolError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Eventing error: {0}")]
    Gena(#[from] GenaError),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("SDK is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, SdkError>;
