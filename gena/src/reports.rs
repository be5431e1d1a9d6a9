//! Delivery reports
//!
//! Every notification job that reaches its subscriber (or fails trying)
//! publishes a [`DeliveryReport`]. Reports are consumed through a blocking
//! iterator so callers never need to poll the device state.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use notify_client::NotifyError;
use parking_lot::Mutex;

use crate::registry::DeviceHandle;

/// What happened to one NOTIFY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The subscriber answered 200 OK
    Delivered,
    /// The subscriber answered 412 Precondition Failed; the subscription was removed
    Rejected,
    /// The subscriber answered with another status; the subscription stays
    Unaccepted(u16),
    /// No delivery URL produced a response
    Network(NotifyError),
}

impl DeliveryOutcome {
    pub(crate) fn from_status(status: u16) -> Self {
        match status {
            200 => DeliveryOutcome::Delivered,
            412 => DeliveryOutcome::Rejected,
            other => DeliveryOutcome::Unaccepted(other),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Result of one notification job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub handle: DeviceHandle,
    pub sid: String,
    /// Event key the notification was sent with
    pub seq: u32,
    pub outcome: DeliveryOutcome,
}

/// Blocking iterator over delivery reports
///
/// `next()` blocks until a report arrives or every sender is gone. Clones
/// share the same queue, so each report is seen by exactly one of them.
pub struct DeliveryReports {
    rx: Arc<Mutex<mpsc::Receiver<DeliveryReport>>>,
}

impl DeliveryReports {
    pub(crate) fn new(rx: mpsc::Receiver<DeliveryReport>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Block until a report is available
    ///
    /// Returns `None` once the eventing side has been dropped.
    pub fn recv(&self) -> Option<DeliveryReport> {
        self.rx.lock().recv().ok()
    }

    /// Receive a report without blocking
    pub fn try_recv(&self) -> Option<DeliveryReport> {
        self.rx.lock().try_recv().ok()
    }

    /// Block until a report is available or `timeout` expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DeliveryReport> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over the reports available right now
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Iterator that waits up to `timeout` for each report
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for DeliveryReports {
    type Item = DeliveryReport;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for DeliveryReports {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Non-blocking iterator over available reports
pub struct TryIter<'a> {
    inner: &'a DeliveryReports,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = DeliveryReport;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with a per-item timeout
pub struct TimeoutIter<'a> {
    inner: &'a DeliveryReports,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIter<'a> {
    type Item = DeliveryReport;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
