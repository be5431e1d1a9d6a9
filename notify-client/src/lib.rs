//! Blocking HTTP client for GENA event delivery
//!
//! Sends `NOTIFY` requests to a subscriber's delivery URL and reports the
//! HTTP status the subscriber answered with. Interpreting the status (accepted,
//! rejected subscription, other refusal) is left to the caller.

mod error;

pub use error::NotifyError;

use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Connect and read timeout used by [`NotifyClient::new`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One NOTIFY message addressed to a single subscription
#[derive(Debug, Clone, Copy)]
pub struct NotifyRequest<'a> {
    /// Subscription id, sent as the `SID` header
    pub sid: &'a str,
    /// Event key, sent as the `SEQ` header
    pub seq: u32,
    /// Event headers (`CONTENT-TYPE`, `NT`, `NTS`, ...)
    pub headers: &'a [(String, String)],
    /// Property set XML
    pub body: &'a str,
}

/// A minimal NOTIFY client
#[derive(Debug, Clone)]
pub struct NotifyClient {
    agent: ureq::Agent,
}

impl NotifyClient {
    /// Create a client with the default 30 second timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// Create a client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Send `request` to `url` and return the HTTP status of the response
    ///
    /// Any HTTP response, including error statuses, is `Ok`. Only failures to
    /// obtain a response at all are errors.
    pub fn notify(&self, url: &Url, request: &NotifyRequest<'_>) -> Result<u16, NotifyError> {
        if url.scheme() != "http" || url.host_str().is_none() {
            return Err(NotifyError::InvalidUrl(url.to_string()));
        }

        let mut call = self.agent.request_url("NOTIFY", url);
        for (name, value) in request.headers {
            // ureq computes the length from the body it sends
            if name.eq_ignore_ascii_case("CONTENT-LENGTH") {
                continue;
            }
            call = call.set(name, value);
        }
        let call = call
            .set("SID", request.sid)
            .set("SEQ", &request.seq.to_string());

        trace!("NOTIFY {} SID {} SEQ {}", url, request.sid, request.seq);

        match call.send_string(request.body) {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(status, _)) => {
                debug!("NOTIFY {} answered with HTTP {}", url, status);
                Ok(status)
            }
            Err(e) => Err(NotifyError::Network(e.to_string())),
        }
    }
}

impl Default for NotifyClient {
    fn default() -> Self {
        Self::new()
    }
}
