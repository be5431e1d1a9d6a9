//! Error types for GENA eventing

use thiserror::Error;
use threadutil::ThreadPoolError;

use crate::registry::DeviceHandle;

/// Errors returned by [`GenaDevice`](crate::GenaDevice) operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenaError {
    /// No registered device carries this handle
    #[error("Unknown device handle {0}")]
    BadHandle(DeviceHandle),

    /// The device has no service with this id under this UDN
    #[error("No service {service_id} for device {udn}")]
    BadService { udn: String, service_id: String },

    /// No live subscription with this SID, or it is in the wrong state
    #[error("Bad subscription id {0}")]
    BadSid(String),

    /// Malformed caller input
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// The service already holds its maximum number of subscriptions
    #[error("Too many subscriptions (limit {limit})")]
    TooManySubscriptions { limit: usize },

    /// The send pool refused a notification job
    #[error("Thread pool error: {0}")]
    Pool(#[from] ThreadPoolError),
}

/// Result type for GENA operations
pub type Result<T> = std::result::Result<T, GenaError>;
