//! Subscriptions and their outgoing notification queues

use std::time::{Duration, Instant};

use threadutil::{Job, JobId, LinkedList};
use tracing::{debug, error};
use url::Url;

use crate::error::{GenaError, Result};

/// Bounds on a subscription's outgoing queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQueueLimits {
    /// Queue length at which the oldest waiting notification is dropped
    /// Default: 10
    pub max_len: usize,

    /// Age past which a waiting notification is dropped
    /// Default: 30 seconds
    pub max_age: Duration,
}

impl Default for EventQueueLimits {
    fn default() -> Self {
        Self {
            max_len: 10,
            max_age: Duration::from_secs(30),
        }
    }
}

impl EventQueueLimits {
    /// The in-flight head always stays queued, so a bound below 2 could
    /// not hold once a waiting entry is appended.
    pub fn validate(&self) -> Result<()> {
        if self.max_len < 2 {
            return Err(GenaError::InvalidParam(
                "max_len must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a queued notification stands
pub(crate) enum EntryState {
    /// Built but not yet handed to the pool
    Waiting(Job),
    /// Handed to the pool; only ever the queue head
    Submitted(JobId),
}

/// One entry of a subscription's outgoing queue
pub(crate) struct QueuedNotify {
    pub(crate) created: Instant,
    pub(crate) state: EntryState,
}

impl QueuedNotify {
    pub(crate) fn waiting(job: Job) -> Self {
        Self {
            created: Instant::now(),
            state: EntryState::Waiting(job),
        }
    }

    pub(crate) fn submitted(id: JobId) -> Self {
        Self {
            created: Instant::now(),
            state: EntryState::Submitted(id),
        }
    }

    pub(crate) fn is_submitted(&self) -> bool {
        matches!(self.state, EntryState::Submitted(_))
    }
}

/// A control point's registration for events from one service
pub struct Subscription {
    sid: String,
    to_send_key: u32,
    expires: Option<Instant>,
    active: bool,
    delivery_urls: Vec<Url>,
    pub(crate) outgoing: LinkedList<QueuedNotify>,
}

impl Subscription {
    pub(crate) fn new(sid: String, delivery_urls: Vec<Url>, timeout: Option<Duration>) -> Self {
        Self {
            sid,
            to_send_key: 0,
            expires: expiry(timeout),
            active: false,
            delivery_urls,
            outgoing: LinkedList::new(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Event key the next notification is sent with
    pub fn to_send_key(&self) -> u32 {
        self.to_send_key
    }

    /// Whether the initial notification has been issued
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn delivery_urls(&self) -> &[Url] {
        &self.delivery_urls
    }

    /// Expiry instant, `None` for a subscription that never expires
    pub fn expires(&self) -> Option<Instant> {
        self.expires
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires.map_or(false, |at| now >= at)
    }

    /// Notifications queued, the in-flight head included
    pub fn queued(&self) -> usize {
        self.outgoing.len()
    }

    pub(crate) fn activate(&mut self) {
        self.active = true;
    }

    pub(crate) fn renew(&mut self, timeout: Option<Duration>) {
        self.expires = expiry(timeout);
    }

    /// Move to the next event key, wrapping to 1 since 0 marks the initial event
    pub(crate) fn advance_key(&mut self) {
        self.to_send_key = match self.to_send_key.checked_add(1) {
            Some(key) => key,
            None => 1,
        };
    }
}

/// Expiry instant for a granted timeout; one past the clock's range never expires
fn expiry(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("sid", &self.sid)
            .field("to_send_key", &self.to_send_key)
            .field("active", &self.active)
            .field("delivery_urls", &self.delivery_urls)
            .field("queued", &self.outgoing.len())
            .finish()
    }
}

/// Drop waiting notifications that are too old, or that would push the queue
/// past `max_len` once one more entry is appended
///
/// The head is never dropped since it is already with the pool. Returns the
/// number of dropped entries; each one releases its payload reference.
pub(crate) fn maybe_discard_events(
    queue: &mut LinkedList<QueuedNotify>,
    limits: &EventQueueLimits,
) -> usize {
    let now = Instant::now();
    let mut dropped = 0;

    while queue.len() > 1 {
        let candidate = queue.head().and_then(|head| queue.next(head));
        debug_assert!(candidate.is_some(), "notification queue lost its second entry");
        let Some(candidate) = candidate else {
            error!("Notification queue of length {} has no second entry", queue.len());
            break;
        };

        let too_old = queue
            .get(candidate)
            .map_or(false, |entry| now.saturating_duration_since(entry.created) > limits.max_age);

        if queue.len() < limits.max_len && !too_old {
            break;
        }

        if queue.delete(candidate) {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!("Discarded {} queued notifications", dropped);
    }
    dropped
}

/// Parse a `CALLBACK` header value of the form `<url1><url2>...`
///
/// Only absolute `http` URLs with a host are kept. Fails when none remain.
pub fn parse_delivery_urls(callback: &str) -> Result<Vec<Url>> {
    let mut urls = Vec::new();
    let mut rest = callback.trim();

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };

        let candidate = after[..end].trim();
        match Url::parse(candidate) {
            Ok(url) if url.scheme() == "http" && url.host_str().is_some() => urls.push(url),
            Ok(_) => debug!("Ignoring non-http delivery URL {}", candidate),
            Err(e) => debug!("Ignoring malformed delivery URL {}: {}", candidate, e),
        }
        rest = &after[end + 1..];
    }

    if urls.is_empty() {
        return Err(GenaError::InvalidParam(format!(
            "no usable delivery URL in {:?}",
            callback
        )));
    }
    Ok(urls)
}
