//! Device-side eventing
//!
//! [`GenaDevice`] owns the device handle table and turns every event into
//! one notification job per subscription. Each subscription keeps its jobs in
//! an outgoing queue whose head is the only one handed to the send pool; the
//! next entry is submitted when the head completes. This keeps delivery per
//! subscriber strictly ordered with at most one NOTIFY in flight, while
//! different subscribers proceed in parallel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify_client::{NotifyError, NotifyRequest};
use parking_lot::Mutex;
use threadutil::{Job, JobRoutine, Priority, ThreadPool, ThreadPoolError};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{GenaError, Result};
use crate::payload::NotifyPayload;
use crate::registry::{DeviceConfig, DeviceHandle, DeviceRegistry};
use crate::reports::{DeliveryOutcome, DeliveryReport, DeliveryReports};
use crate::subscription::{
    maybe_discard_events, parse_delivery_urls, EntryState, EventQueueLimits, QueuedNotify,
    Subscription,
};
use crate::transport::NotifyTransport;

/// Delivery reports held for the application before new ones are dropped
pub const DEFAULT_REPORT_CAPACITY: usize = 1000;

/// A subscription granted by [`GenaDevice::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGrant {
    pub sid: String,
    /// Granted duration, `None` for infinite
    pub timeout: Option<Duration>,
}

struct GenaInner {
    registry: Mutex<DeviceRegistry>,
    limits: EventQueueLimits,
    pool: ThreadPool,
    transport: Arc<dyn NotifyTransport>,
    reports: SyncSender<DeliveryReport>,
}

/// Job routine delivering one payload to one subscription
struct NotifyTask {
    inner: Weak<GenaInner>,
    payload: Arc<NotifyPayload>,
    handle: DeviceHandle,
    sid: String,
}

impl JobRoutine for NotifyTask {
    fn run(self: Box<Self>) {
        let task = *self;
        match task.inner.upgrade() {
            Some(inner) => inner.run_notification(task),
            None => debug!("Eventing stopped, dropping notification for {}", task.sid),
        }
    }
}

impl GenaInner {
    fn notification_job(
        self: &Arc<Self>,
        payload: &Arc<NotifyPayload>,
        handle: DeviceHandle,
        sid: &str,
    ) -> Job {
        Job::from_routine(NotifyTask {
            inner: Arc::downgrade(self),
            payload: Arc::clone(payload),
            handle,
            sid: sid.to_string(),
        })
        .with_priority(Priority::Med)
    }

    /// Prune, then append `job`; an empty queue hands it to the pool at once
    fn enqueue(&self, sub: &mut Subscription, job: Job) -> std::result::Result<(), ThreadPoolError> {
        maybe_discard_events(&mut sub.outgoing, &self.limits);

        if !sub.outgoing.is_empty() {
            sub.outgoing.add_tail(QueuedNotify::waiting(job));
            return Ok(());
        }

        let id = self.pool.add(job).map_err(|e| e.discard())?;
        sub.outgoing.add_tail(QueuedNotify::submitted(id));
        Ok(())
    }

    /// Hand the queue head to the pool, dropping heads the pool refuses
    fn submit_head(&self, sub: &mut Subscription) {
        while let Some(entry) = sub.outgoing.pop_head() {
            let QueuedNotify { created, state } = entry;
            let job = match state {
                EntryState::Waiting(job) => job,
                EntryState::Submitted(id) => {
                    debug_assert!(false, "queued notification {} submitted twice", id);
                    warn!("Notification job {} for {} already submitted", id, sub.sid());
                    sub.outgoing.add_head(QueuedNotify {
                        created,
                        state: EntryState::Submitted(id),
                    });
                    return;
                }
            };

            match self.pool.add(job) {
                Ok(id) => {
                    sub.outgoing.add_head(QueuedNotify {
                        created,
                        state: EntryState::Submitted(id),
                    });
                    return;
                }
                Err(e) => {
                    warn!("Dropping notification for {}: {}", sub.sid(), e);
                    e.discard();
                }
            }
        }
    }

    fn run_notification(&self, task: NotifyTask) {
        let NotifyTask {
            payload,
            handle,
            sid,
            ..
        } = task;

        let target = {
            let mut registry = self.registry.lock();
            registry
                .subscription_mut(handle, payload.udn(), payload.service_id(), &sid)
                .map(|sub| (sub.delivery_urls().to_vec(), sub.to_send_key()))
        };
        let Some((urls, seq)) = target else {
            debug!("Subscription {} gone before delivery", sid);
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.deliver(&urls, &sid, seq, &payload)
        }))
        .unwrap_or_else(|cause| {
            let message = panic_message(cause.as_ref());
            error!("NOTIFY {} SEQ {} panicked in transport: {}", sid, seq, message);
            DeliveryOutcome::Network(NotifyError::Network(format!(
                "transport panicked: {message}"
            )))
        });

        {
            let mut registry = self.registry.lock();
            let Ok(service) = registry.service_mut(handle, payload.udn(), payload.service_id())
            else {
                debug!("Service {} gone after delivery", payload.service_id());
                return;
            };
            let Some(sub) = service.subscription_mut(&sid) else {
                debug!("Subscription {} gone after delivery", sid);
                return;
            };

            sub.advance_key();
            let completed = sub.outgoing.pop_head();
            debug_assert!(
                completed.as_ref().map_or(false, QueuedNotify::is_submitted),
                "completed notification was not the submitted head"
            );

            if outcome == DeliveryOutcome::Rejected {
                info!("Subscriber rejected {}, removing subscription", sid);
                service.remove_subscription(&sid);
            } else {
                self.submit_head(sub);
            }
        }

        drop(payload);
        match self.reports.try_send(DeliveryReport {
            handle,
            sid,
            seq,
            outcome,
        }) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(report)) => {
                warn!(
                    "Report buffer full, dropping report for {} SEQ {}",
                    report.sid, report.seq
                );
            }
        }
    }

    /// Try each delivery URL until one produces an HTTP response
    fn deliver(&self, urls: &[Url], sid: &str, seq: u32, payload: &NotifyPayload) -> DeliveryOutcome {
        let request = NotifyRequest {
            sid,
            seq,
            headers: payload.headers(),
            body: payload.property_set(),
        };

        let mut last_error = None;
        for url in urls {
            match self.transport.send(url, &request) {
                Ok(status) => {
                    debug!("NOTIFY {} SEQ {} to {}: HTTP {}", sid, seq, url, status);
                    return DeliveryOutcome::from_status(status);
                }
                Err(e) => {
                    debug!("NOTIFY {} to {} failed: {}", sid, url, e);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| NotifyError::InvalidUrl("no delivery URL".to_string()));
        warn!("NOTIFY {} SEQ {} not delivered: {}", sid, seq, error);
        DeliveryOutcome::Network(error)
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Device-side GENA eventing
///
/// Cloning yields another handle to the same device table.
#[derive(Clone)]
pub struct GenaDevice {
    inner: Arc<GenaInner>,
}

impl GenaDevice {
    /// Create the eventing state on top of `pool`
    ///
    /// Returns the device together with the iterator its delivery reports
    /// arrive on. At most [`DEFAULT_REPORT_CAPACITY`] unread reports are kept.
    pub fn new(
        pool: ThreadPool,
        transport: Arc<dyn NotifyTransport>,
        limits: EventQueueLimits,
    ) -> Result<(Self, DeliveryReports)> {
        Self::with_report_capacity(pool, transport, limits, DEFAULT_REPORT_CAPACITY)
    }

    /// Like [`GenaDevice::new`], keeping at most `capacity` unread reports
    ///
    /// Reports produced while the buffer is full are dropped with a warning.
    pub fn with_report_capacity(
        pool: ThreadPool,
        transport: Arc<dyn NotifyTransport>,
        limits: EventQueueLimits,
        capacity: usize,
    ) -> Result<(Self, DeliveryReports)> {
        limits.validate()?;
        if capacity == 0 {
            return Err(GenaError::InvalidParam(
                "report capacity must be greater than 0".to_string(),
            ));
        }
        let (tx, rx) = mpsc::sync_channel(capacity);

        let device = Self {
            inner: Arc::new(GenaInner {
                registry: Mutex::new(DeviceRegistry::default()),
                limits,
                pool,
                transport,
                reports: tx,
            }),
        };

        Ok((device, DeliveryReports::new(rx)))
    }

    pub fn limits(&self) -> EventQueueLimits {
        self.inner.limits
    }

    /// Register a device and its evented services
    pub fn register_device(&self, config: DeviceConfig) -> DeviceHandle {
        let services = config.services.len();
        let handle = self.inner.registry.lock().register(config);
        info!("Registered device {} with {} services", handle, services);
        handle
    }

    /// Remove a device; every queued notification of its subscriptions is dropped
    pub fn unregister_device(&self, handle: DeviceHandle) -> Result<()> {
        let device = self.inner.registry.lock().unregister(handle)?;
        drop(device);
        info!("Unregistered device {}", handle);
        Ok(())
    }

    /// Remove every device, returning how many there were
    pub fn unregister_all(&self) -> usize {
        let devices = self.inner.registry.lock().drain();
        devices.len()
    }

    /// Accept a new subscription from the `CALLBACK` header value `callback`
    ///
    /// The subscription stays inactive until its initial notification is
    /// issued with [`GenaDevice::init_notify`].
    pub fn subscribe(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        callback: &str,
        timeout: Option<Duration>,
    ) -> Result<SubscriptionGrant> {
        let urls = parse_delivery_urls(callback)?;

        let mut registry = self.inner.registry.lock();
        let device = registry.device_mut(handle)?;
        let timeout = device.config.clamp_timeout(timeout);
        let limit = device.config.max_subscriptions;
        let service = device
            .services
            .find_service_mut(service_id, udn)
            .ok_or_else(|| GenaError::BadService {
                udn: udn.to_string(),
                service_id: service_id.to_string(),
            })?;

        service.remove_expired();
        if let Some(limit) = limit {
            if service.subscription_count() >= limit {
                return Err(GenaError::TooManySubscriptions { limit });
            }
        }

        let sid = format!("uuid:{}", Uuid::new_v4());
        service.add_subscription(Subscription::new(sid.clone(), urls, timeout));
        info!("New subscription {} on {} ({:?})", sid, service_id, timeout);

        Ok(SubscriptionGrant { sid, timeout })
    }

    /// Extend a subscription, returning the granted duration
    pub fn renew(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        sid: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Duration>> {
        let mut registry = self.inner.registry.lock();
        let timeout = registry.device(handle)?.config.clamp_timeout(timeout);
        let sub = registry
            .service_mut(handle, udn, service_id)?
            .subscription_mut(sid)
            .ok_or_else(|| GenaError::BadSid(sid.to_string()))?;

        sub.renew(timeout);
        debug!("Renewed subscription {} ({:?})", sid, timeout);
        Ok(timeout)
    }

    /// Cancel a subscription, dropping its queued notifications
    pub fn unsubscribe(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        sid: &str,
    ) -> Result<()> {
        let removed = self
            .inner
            .registry
            .lock()
            .service_mut(handle, udn, service_id)?
            .remove_subscription(sid)
            .ok_or_else(|| GenaError::BadSid(sid.to_string()))?;

        info!("Removed subscription {}", removed.sid());
        Ok(())
    }

    /// Send the initial event to a new subscription and activate it
    pub fn init_notify<N, V>(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        variables: &[(N, V)],
        sid: &str,
    ) -> Result<()>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let payload = NotifyPayload::from_variables(udn, service_id, variables);
        self.init_notify_common(handle, payload, sid)
    }

    /// [`GenaDevice::init_notify`] with an already serialized property set
    pub fn init_notify_ext(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        property_set: impl Into<String>,
        sid: &str,
    ) -> Result<()> {
        let payload = NotifyPayload::new(udn, service_id, property_set);
        self.init_notify_common(handle, payload, sid)
    }

    fn init_notify_common(&self, handle: DeviceHandle, payload: NotifyPayload, sid: &str) -> Result<()> {
        let payload = Arc::new(payload);
        let mut registry = self.inner.registry.lock();
        let sub = registry
            .service_mut(handle, payload.udn(), payload.service_id())?
            .subscription_mut(sid)
            .ok_or_else(|| GenaError::BadSid(sid.to_string()))?;

        if sub.is_active() {
            return Err(GenaError::BadSid(sid.to_string()));
        }

        let job = self.inner.notification_job(&payload, handle, sid);
        self.inner.enqueue(sub, job)?;
        sub.activate();

        debug!("Initial notification for {} queued", sid);
        Ok(())
    }

    /// Send an event to every active subscription of a service
    ///
    /// Returns the number of subscriptions the event was queued for.
    pub fn notify_all<N, V>(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        variables: &[(N, V)],
    ) -> Result<usize>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let payload = NotifyPayload::from_variables(udn, service_id, variables);
        self.notify_all_common(handle, payload)
    }

    /// [`GenaDevice::notify_all`] with an already serialized property set
    pub fn notify_all_ext(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        property_set: impl Into<String>,
    ) -> Result<usize> {
        let payload = NotifyPayload::new(udn, service_id, property_set);
        self.notify_all_common(handle, payload)
    }

    fn notify_all_common(&self, handle: DeviceHandle, payload: NotifyPayload) -> Result<usize> {
        let payload = Arc::new(payload);
        let mut registry = self.inner.registry.lock();
        let service = registry.service_mut(handle, payload.udn(), payload.service_id())?;

        let mut queued = 0;
        for sub in service.active_subscriptions_mut() {
            let job = self.inner.notification_job(&payload, handle, sub.sid());
            self.inner.enqueue(sub, job)?;
            queued += 1;
        }

        debug!("Event on {} queued for {} subscriptions", payload.service_id(), queued);
        Ok(queued)
    }

    /// Drop expired subscriptions of every device, returning how many went
    pub fn expire_subscriptions(&self) -> usize {
        let mut registry = self.inner.registry.lock();
        let expired: usize = registry
            .devices_mut()
            .flat_map(|device| device.services.services_mut())
            .map(|service| service.remove_expired())
            .sum();

        if expired > 0 {
            info!("Expired {} subscriptions", expired);
        }
        expired
    }

    /// Subscriptions held by a service
    pub fn subscription_count(&self, handle: DeviceHandle, udn: &str, service_id: &str) -> Result<usize> {
        let mut registry = self.inner.registry.lock();
        let service = registry.service_mut(handle, udn, service_id)?;
        service.remove_expired();
        Ok(service.subscription_count())
    }

    /// Notifications queued for a subscription, the in-flight one included
    pub fn queued_notifications(
        &self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        sid: &str,
    ) -> Result<usize> {
        self.inner
            .registry
            .lock()
            .service_mut(handle, udn, service_id)?
            .subscription_mut(sid)
            .map(|sub| sub.queued())
            .ok_or_else(|| GenaError::BadSid(sid.to_string()))
    }

    /// Event key the next notification to `sid` carries
    pub fn event_key(&self, handle: DeviceHandle, udn: &str, service_id: &str, sid: &str) -> Result<u32> {
        self.inner
            .registry
            .lock()
            .service_mut(handle, udn, service_id)?
            .subscription_mut(sid)
            .map(|sub| sub.to_send_key())
            .ok_or_else(|| GenaError::BadSid(sid.to_string()))
    }
}

impl std::fmt::Debug for GenaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaDevice")
            .field("limits", &self.inner.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceDesc;
    use notify_client::NotifyRequest;
    use threadutil::ThreadPoolAttr;

    const UDN: &str = "uuid:device-1";
    const SERVICE: &str = "urn:upnp-org:serviceId:RenderingControl";

    /// Transport that records requests and answers with a fixed status
    struct Recorder {
        status: u16,
        seen: Mutex<Vec<(String, u32, String)>>,
    }

    impl NotifyTransport for Recorder {
        fn send(&self, url: &Url, request: &NotifyRequest<'_>) -> std::result::Result<u16, NotifyError> {
            self.seen
                .lock()
                .push((url.to_string(), request.seq, request.body.to_string()));
            Ok(self.status)
        }
    }

    fn setup(status: u16) -> (GenaDevice, DeliveryReports, Arc<Recorder>, ThreadPool, DeviceHandle) {
        let pool = ThreadPool::new(ThreadPoolAttr::default()).unwrap();
        let recorder = Arc::new(Recorder {
            status,
            seen: Mutex::new(Vec::new()),
        });
        let (device, reports) = GenaDevice::new(
            pool.clone(),
            Arc::clone(&recorder) as Arc<dyn NotifyTransport>,
            EventQueueLimits::default(),
        )
        .unwrap();
        let handle = device.register_device(DeviceConfig::new(vec![ServiceDesc::new(
            UDN,
            SERVICE,
            "urn:schemas-upnp-org:service:RenderingControl:1",
        )]));
        (device, reports, recorder, pool, handle)
    }

    #[test]
    fn test_initial_notify_activates_and_delivers() {
        let (device, reports, recorder, pool, handle) = setup(200);
        let grant = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2:3400/cb>", None)
            .unwrap();
        assert!(grant.sid.starts_with("uuid:"));

        device
            .init_notify(handle, UDN, SERVICE, &[("Volume", "10")], &grant.sid)
            .unwrap();
        let report = reports.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.seq, 0);
        assert_eq!(report.outcome, DeliveryOutcome::Delivered);
        assert_eq!(device.event_key(handle, UDN, SERVICE, &grant.sid).unwrap(), 1);

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "http://10.0.0.2:3400/cb");
        assert!(seen[0].2.contains("<Volume>10</Volume>"));

        // A second initial notify is refused once active
        assert_eq!(
            device
                .init_notify(handle, UDN, SERVICE, &[("Volume", "10")], &grant.sid)
                .unwrap_err(),
            GenaError::BadSid(grant.sid.clone())
        );

        pool.shutdown();
    }

    #[test]
    fn test_notify_all_skips_inactive_subscriptions() {
        let (device, reports, _recorder, pool, handle) = setup(200);
        let active = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2/cb>", None)
            .unwrap();
        let _pending = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.3/cb>", None)
            .unwrap();

        device
            .init_notify_ext(handle, UDN, SERVICE, "<e:propertyset/>", &active.sid)
            .unwrap();
        reports.recv_timeout(Duration::from_secs(5)).unwrap();

        let queued = device
            .notify_all(handle, UDN, SERVICE, &[("Mute", "1")])
            .unwrap();
        assert_eq!(queued, 1);

        let report = reports.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.sid, active.sid);
        assert_eq!(report.seq, 1);

        pool.shutdown();
    }

    #[test]
    fn test_rejection_removes_subscription() {
        let (device, reports, _recorder, pool, handle) = setup(412);
        let grant = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2/cb>", None)
            .unwrap();

        device
            .init_notify(handle, UDN, SERVICE, &[("Volume", "1")], &grant.sid)
            .unwrap();
        let report = reports.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(report.outcome, DeliveryOutcome::Rejected);
        assert_eq!(device.subscription_count(handle, UDN, SERVICE).unwrap(), 0);
        assert_eq!(
            device.queued_notifications(handle, UDN, SERVICE, &grant.sid),
            Err(GenaError::BadSid(grant.sid.clone()))
        );

        pool.shutdown();
    }

    #[test]
    fn test_unaccepted_keeps_subscription() {
        let (device, reports, _recorder, pool, handle) = setup(500);
        let grant = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2/cb>", None)
            .unwrap();

        device
            .init_notify(handle, UDN, SERVICE, &[("Volume", "1")], &grant.sid)
            .unwrap();
        let report = reports.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(report.outcome, DeliveryOutcome::Unaccepted(500));
        assert_eq!(device.subscription_count(handle, UDN, SERVICE).unwrap(), 1);
        assert_eq!(device.event_key(handle, UDN, SERVICE, &grant.sid).unwrap(), 1);

        pool.shutdown();
    }

    #[test]
    fn test_invalid_limits_refused() {
        let pool = ThreadPool::new(ThreadPoolAttr::default()).unwrap();
        let transport = || -> Arc<dyn NotifyTransport> {
            Arc::new(Recorder {
                status: 200,
                seen: Mutex::new(Vec::new()),
            })
        };

        let short_queue = EventQueueLimits {
            max_len: 1,
            ..Default::default()
        };
        assert!(matches!(
            GenaDevice::new(pool.clone(), transport(), short_queue),
            Err(GenaError::InvalidParam(_))
        ));
        assert!(matches!(
            GenaDevice::with_report_capacity(pool.clone(), transport(), EventQueueLimits::default(), 0),
            Err(GenaError::InvalidParam(_))
        ));

        pool.shutdown();
    }

    #[test]
    fn test_panic_message() {
        let cause = std::panic::catch_unwind(|| panic!("socket closed")).unwrap_err();
        assert_eq!(panic_message(cause.as_ref()), "socket closed");

        let cause = std::panic::catch_unwind(|| panic!("{} bytes", 12)).unwrap_err();
        assert_eq!(panic_message(cause.as_ref()), "12 bytes");
    }

    #[test]
    fn test_subscription_limits() {
        let pool = ThreadPool::new(ThreadPoolAttr::default()).unwrap();
        let (device, _reports) = GenaDevice::new(
            pool.clone(),
            Arc::new(Recorder {
                status: 200,
                seen: Mutex::new(Vec::new()),
            }),
            EventQueueLimits::default(),
        )
        .unwrap();
        let handle = device.register_device(
            DeviceConfig::new(vec![ServiceDesc::new(UDN, SERVICE, "type")])
                .with_max_subscriptions(1)
                .with_max_subscription_timeout(Duration::from_secs(300)),
        );

        let grant = device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2/cb>", None)
            .unwrap();
        assert_eq!(grant.timeout, Some(Duration::from_secs(300)));

        assert_eq!(
            device
                .subscribe(handle, UDN, SERVICE, "<http://10.0.0.3/cb>", None)
                .unwrap_err(),
            GenaError::TooManySubscriptions { limit: 1 }
        );

        let renewed = device
            .renew(handle, UDN, SERVICE, &grant.sid, Some(Duration::from_secs(60)))
            .unwrap();
        assert_eq!(renewed, Some(Duration::from_secs(60)));

        device.unsubscribe(handle, UDN, SERVICE, &grant.sid).unwrap();
        assert_eq!(
            device.unsubscribe(handle, UDN, SERVICE, &grant.sid).unwrap_err(),
            GenaError::BadSid(grant.sid.clone())
        );

        pool.shutdown();
    }

    #[test]
    fn test_unknown_handle_and_service() {
        let (device, _reports, _recorder, pool, handle) = setup(200);

        assert!(matches!(
            device.notify_all(handle, UDN, "urn:missing", &[("A", "1")]),
            Err(GenaError::BadService { .. })
        ));

        device.unregister_device(handle).unwrap();
        assert_eq!(
            device
                .notify_all(handle, UDN, SERVICE, &[("A", "1")])
                .unwrap_err(),
            GenaError::BadHandle(handle)
        );

        pool.shutdown();
    }

    #[test]
    fn test_expire_subscriptions() {
        let (device, _reports, _recorder, pool, handle) = setup(200);
        device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.3/cb>", None)
            .unwrap();
        device
            .subscribe(handle, UDN, SERVICE, "<http://10.0.0.2/cb>", Some(Duration::ZERO))
            .unwrap();

        assert_eq!(device.expire_subscriptions(), 1);
        assert_eq!(device.subscription_count(handle, UDN, SERVICE).unwrap(), 1);

        pool.shutdown();
    }
}
