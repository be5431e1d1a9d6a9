//! Delivery primitive used by notification jobs

use notify_client::{NotifyClient, NotifyError, NotifyRequest};
use url::Url;

/// Sends one NOTIFY request and returns the subscriber's HTTP status
///
/// Called on a send-pool worker. Implementations block for the whole
/// exchange and enforce their own timeouts.
pub trait NotifyTransport: Send + Sync + 'static {
    fn send(&self, url: &Url, request: &NotifyRequest<'_>) -> Result<u16, NotifyError>;
}

impl NotifyTransport for NotifyClient {
    fn send(&self, url: &Url, request: &NotifyRequest<'_>) -> Result<u16, NotifyError> {
        self.notify(url, request)
    }
}
