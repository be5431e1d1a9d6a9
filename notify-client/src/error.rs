//! Error types for the NOTIFY client

use thiserror::Error;

/// Errors that can occur while delivering a NOTIFY request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The request never produced an HTTP response
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The delivery URL cannot carry a NOTIFY request
    #[error("Invalid delivery URL: {0}")]
    InvalidUrl(String),
}
