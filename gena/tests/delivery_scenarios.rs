//! Ordered delivery scenarios for device eventing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gena::{
    DeliveryOutcome, DeliveryReports, DeviceConfig, DeviceHandle, EventQueueLimits, GenaDevice,
    GenaError, NotifyTransport, ServiceDesc,
};
use mockito::{Matcher, Server};
use notify_client::{NotifyClient, NotifyError, NotifyRequest};
use parking_lot::{Condvar, Mutex};
use threadutil::{ThreadPool, ThreadPoolAttr, ThreadPoolError};
use url::Url;

const UDN: &str = "uuid:renderer-1";
const SERVICE: &str = "urn:upnp-org:serviceId:RenderingControl";
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    url: String,
    sid: String,
    seq: u32,
    body: String,
}

#[derive(Default)]
struct TransportState {
    permits: usize,
    gated: bool,
    in_flight: HashMap<String, usize>,
    max_in_flight_per_sid: usize,
    max_in_flight: usize,
    sent: Vec<Sent>,
}

/// Transport that can hold requests until released and answers from a
/// per-URL table (200 when absent)
#[derive(Default)]
struct MockTransport {
    state: Mutex<TransportState>,
    changed: Condvar,
    responses: Mutex<HashMap<String, Result<u16, NotifyError>>>,
    panics: Mutex<usize>,
}

impl MockTransport {
    fn gated() -> Arc<Self> {
        let transport = Self::default();
        transport.state.lock().gated = true;
        Arc::new(transport)
    }

    fn respond(&self, url: &str, response: Result<u16, NotifyError>) {
        self.responses.lock().insert(url.to_string(), response);
    }

    /// Make the next `count` requests panic inside the transport
    fn panic_next(&self, count: usize) {
        *self.panics.lock() = count;
    }

    fn release(&self, count: usize) {
        self.state.lock().permits += count;
        self.changed.notify_all();
    }

    fn open(&self) {
        self.state.lock().gated = false;
        self.changed.notify_all();
    }

    /// Wait until `count` requests are blocked in the transport
    fn wait_in_flight(&self, count: usize) -> bool {
        let mut state = self.state.lock();
        while state.in_flight.values().sum::<usize>() < count {
            if self.changed.wait_for(&mut state, WAIT).timed_out() {
                return false;
            }
        }
        true
    }

    fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }
}

impl NotifyTransport for MockTransport {
    fn send(&self, url: &Url, request: &NotifyRequest<'_>) -> Result<u16, NotifyError> {
        {
            let mut panics = self.panics.lock();
            if *panics > 0 {
                *panics -= 1;
                drop(panics);
                panic!("socket closed under NOTIFY {} SEQ {}", request.sid, request.seq);
            }
        }

        let mut state = self.state.lock();
        let in_flight = {
            let count = state.in_flight.entry(request.sid.to_string()).or_default();
            *count += 1;
            *count
        };
        state.max_in_flight_per_sid = state.max_in_flight_per_sid.max(in_flight);
        let total = state.in_flight.values().sum::<usize>();
        state.max_in_flight = state.max_in_flight.max(total);
        self.changed.notify_all();

        while state.gated && state.permits == 0 {
            self.changed.wait(&mut state);
        }
        if state.gated {
            state.permits -= 1;
        }

        state.sent.push(Sent {
            url: url.to_string(),
            sid: request.sid.to_string(),
            seq: request.seq,
            body: request.body.to_string(),
        });
        if let Some(count) = state.in_flight.get_mut(request.sid) {
            *count -= 1;
        }
        drop(state);

        self.responses
            .lock()
            .get(url.as_str())
            .cloned()
            .unwrap_or(Ok(200))
    }
}

struct Fixture {
    pool: ThreadPool,
    device: GenaDevice,
    reports: DeliveryReports,
    handle: DeviceHandle,
}

impl Fixture {
    fn new(transport: Arc<MockTransport>, limits: EventQueueLimits) -> Self {
        Self::with_report_capacity(transport, limits, gena::DEFAULT_REPORT_CAPACITY)
    }

    fn with_report_capacity(
        transport: Arc<MockTransport>,
        limits: EventQueueLimits,
        capacity: usize,
    ) -> Self {
        let pool = ThreadPool::new(ThreadPoolAttr {
            min_threads: 2,
            max_threads: Some(8),
            ..Default::default()
        })
        .unwrap();
        let (device, reports) =
            GenaDevice::with_report_capacity(pool.clone(), transport, limits, capacity).unwrap();
        let handle = device.register_device(DeviceConfig::new(vec![ServiceDesc::new(
            UDN,
            SERVICE,
            "urn:schemas-upnp-org:service:RenderingControl:1",
        )]));

        Self {
            pool,
            device,
            reports,
            handle,
        }
    }

    fn subscribe(&self, callback: &str) -> String {
        self.device
            .subscribe(self.handle, UDN, SERVICE, callback, None)
            .unwrap()
            .sid
    }

    fn init(&self, sid: &str, value: &str) {
        self.device
            .init_notify(self.handle, UDN, SERVICE, &[("Event", value)], sid)
            .unwrap();
    }

    fn event(&self, value: &str) -> usize {
        self.device
            .notify_all(self.handle, UDN, SERVICE, &[("Event", value)])
            .unwrap()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn event_value(body: &str) -> &str {
    let start = body.find("<Event>").map(|i| i + "<Event>".len()).unwrap_or(0);
    let end = body.find("</Event>").unwrap_or(body.len());
    &body[start..end]
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_events_delivered_in_order_one_at_a_time() {
    let transport = MockTransport::gated();
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2:3400/notify>");

    fixture.init(&sid, "e0");
    assert!(transport.wait_in_flight(1));
    for value in ["e1", "e2", "e3"] {
        assert_eq!(fixture.event(value), 1);
    }
    assert_eq!(
        fixture
            .device
            .queued_notifications(fixture.handle, UDN, SERVICE, &sid)
            .unwrap(),
        4
    );

    transport.open();
    let seqs: Vec<_> = fixture.reports.timeout_iter(WAIT).take(4).map(|r| r.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    let sent = transport.sent();
    let values: Vec<_> = sent.iter().map(|s| event_value(&s.body)).collect();
    assert_eq!(values, vec!["e0", "e1", "e2", "e3"]);
    assert_eq!(transport.state.lock().max_in_flight_per_sid, 1);
}

#[test]
fn test_full_queue_drops_oldest_waiting_event() {
    let transport = MockTransport::gated();
    let fixture = Fixture::new(
        Arc::clone(&transport),
        EventQueueLimits {
            max_len: 5,
            max_age: Duration::from_secs(30),
        },
    );
    let sid = fixture.subscribe("<http://10.0.0.2:3400/notify>");

    fixture.init(&sid, "e1");
    assert!(transport.wait_in_flight(1));
    for value in ["e2", "e3", "e4", "e5", "e6", "e7"] {
        fixture.event(value);
    }
    assert_eq!(
        fixture
            .device
            .queued_notifications(fixture.handle, UDN, SERVICE, &sid)
            .unwrap(),
        5
    );

    transport.open();
    let reports: Vec<_> = fixture.reports.timeout_iter(WAIT).take(5).collect();
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.outcome.is_delivered()));

    let values: Vec<_> = transport
        .sent()
        .iter()
        .map(|s| event_value(&s.body).to_string())
        .collect();
    assert_eq!(values, vec!["e1", "e4", "e5", "e6", "e7"]);
    let seqs: Vec<_> = transport.sent().iter().map(|s| s.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_subscribers_are_served_in_parallel() {
    let transport = MockTransport::gated();
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let first = fixture.subscribe("<http://10.0.0.2/a>");
    let second = fixture.subscribe("<http://10.0.0.3/b>");

    fixture.init(&first, "init");
    fixture.init(&second, "init");
    assert!(transport.wait_in_flight(2));
    assert_eq!(fixture.event("shared"), 2);

    transport.open();
    let reports: Vec<_> = fixture.reports.timeout_iter(WAIT).take(4).collect();
    assert_eq!(reports.len(), 4);

    for sid in [&first, &second] {
        let seqs: Vec<_> = reports.iter().filter(|r| &r.sid == sid).map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }
    let state = transport.state.lock();
    assert_eq!(state.max_in_flight, 2);
    assert_eq!(state.max_in_flight_per_sid, 1);
}

// ============================================================================
// Delivery Outcomes
// ============================================================================

#[test]
fn test_next_url_tried_after_network_error() {
    let transport = Arc::new(MockTransport::default());
    transport.respond(
        "http://10.0.0.2/down",
        Err(NotifyError::Network("connection refused".to_string())),
    );
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/down><http://10.0.0.3/up>");

    fixture.init(&sid, "e0");
    let report = fixture.reports.recv_timeout(WAIT).unwrap();

    assert_eq!(report.outcome, DeliveryOutcome::Delivered);
    let urls: Vec<_> = transport.sent().into_iter().map(|s| s.url).collect();
    assert_eq!(urls, vec!["http://10.0.0.2/down", "http://10.0.0.3/up"]);
}

#[test]
fn test_unreachable_subscriber_keeps_subscription() {
    let transport = Arc::new(MockTransport::default());
    transport.respond(
        "http://10.0.0.2/down",
        Err(NotifyError::Network("timed out".to_string())),
    );
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/down>");

    fixture.init(&sid, "e0");
    let report = fixture.reports.recv_timeout(WAIT).unwrap();
    assert!(matches!(report.outcome, DeliveryOutcome::Network(_)));

    fixture.event("e1");
    let report = fixture.reports.recv_timeout(WAIT).unwrap();
    assert_eq!(report.seq, 1);
    assert_eq!(
        fixture
            .device
            .subscription_count(fixture.handle, UDN, SERVICE)
            .unwrap(),
        1
    );
}

#[test]
fn test_transport_panic_reported_and_queue_continues() {
    let transport = MockTransport::gated();
    transport.panic_next(1);
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/notify>");

    fixture.init(&sid, "e0");
    fixture.event("e1");
    fixture.event("e2");
    transport.open();

    let reports: Vec<_> = fixture.reports.timeout_iter(WAIT).take(3).collect();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].seq, 0);
    assert!(matches!(
        &reports[0].outcome,
        DeliveryOutcome::Network(NotifyError::Network(message))
            if message.contains("transport panicked")
    ));
    assert_eq!(reports[1].seq, 1);
    assert_eq!(reports[2].seq, 2);
    assert!(reports[1..].iter().all(|r| r.outcome.is_delivered()));

    let bodies: Vec<_> = transport
        .sent()
        .iter()
        .map(|s| event_value(&s.body).to_string())
        .collect();
    assert_eq!(bodies, vec!["e1", "e2"]);
    assert_eq!(
        fixture
            .device
            .queued_notifications(fixture.handle, UDN, SERVICE, &sid),
        Ok(0)
    );
}

#[test]
fn test_rejection_drops_queued_events() {
    let transport = MockTransport::gated();
    transport.respond("http://10.0.0.2/gone", Ok(412));
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/gone>");

    fixture.init(&sid, "e0");
    assert!(transport.wait_in_flight(1));
    fixture.event("e1");
    fixture.event("e2");

    transport.open();
    let report = fixture.reports.recv_timeout(WAIT).unwrap();
    assert_eq!(report.outcome, DeliveryOutcome::Rejected);
    assert!(fixture.reports.recv_timeout(Duration::from_millis(200)).is_none());
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(
        fixture
            .device
            .queued_notifications(fixture.handle, UDN, SERVICE, &sid),
        Err(GenaError::BadSid(sid))
    );
}

#[test]
fn test_unregister_during_delivery_stops_the_queue() {
    let transport = MockTransport::gated();
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/notify>");

    fixture.init(&sid, "e0");
    assert!(transport.wait_in_flight(1));
    fixture.event("e1");
    fixture.device.unregister_device(fixture.handle).unwrap();

    transport.release(1);
    assert!(fixture.reports.recv_timeout(Duration::from_millis(300)).is_none());
    assert_eq!(transport.sent().len(), 1);
}

#[test]
fn test_unread_reports_bounded_by_capacity() {
    let transport = Arc::new(MockTransport::default());
    let fixture =
        Fixture::with_report_capacity(Arc::clone(&transport), EventQueueLimits::default(), 2);
    let sid = fixture.subscribe("<http://10.0.0.2/notify>");

    fixture.init(&sid, "e0");
    for value in ["e1", "e2", "e3", "e4"] {
        fixture.event(value);
    }

    assert!(eventually(|| transport.sent().len() == 5));
    assert!(eventually(|| {
        fixture
            .device
            .queued_notifications(fixture.handle, UDN, SERVICE, &sid)
            == Ok(0)
    }));
    std::thread::sleep(Duration::from_millis(50));

    let seqs: Vec<_> = fixture.reports.try_iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![0, 1]);

    fixture.event("e5");
    let report = fixture.reports.recv_timeout(WAIT).unwrap();
    assert_eq!(report.seq, 5);
    assert!(report.outcome.is_delivered());
}

#[test]
fn test_shut_down_pool_refuses_events() {
    let transport = Arc::new(MockTransport::default());
    let fixture = Fixture::new(Arc::clone(&transport), EventQueueLimits::default());
    let sid = fixture.subscribe("<http://10.0.0.2/notify>");
    fixture.pool.shutdown();

    assert_eq!(
        fixture
            .device
            .init_notify(fixture.handle, UDN, SERVICE, &[("Event", "e0")], &sid),
        Err(GenaError::Pool(ThreadPoolError::ShutDown))
    );
    // Still inactive, so not counted by notify_all
    assert_eq!(fixture.event("e1"), 0);
}

// ============================================================================
// HTTP
// ============================================================================

#[test]
fn test_notify_reaches_http_subscriber() {
    let mut server = Server::new();
    let pool = ThreadPool::new(ThreadPoolAttr::default()).unwrap();
    let (device, reports) = GenaDevice::new(
        pool.clone(),
        Arc::new(NotifyClient::new()),
        EventQueueLimits::default(),
    )
    .unwrap();
    let handle = device.register_device(DeviceConfig::new(vec![ServiceDesc::new(
        UDN, SERVICE, "type",
    )]));
    let grant = device
        .subscribe(
            handle,
            UDN,
            SERVICE,
            &format!("<{}/upnp/event>", server.url()),
            Some(Duration::from_secs(1800)),
        )
        .unwrap();

    let mock = server
        .mock("NOTIFY", "/upnp/event")
        .match_header("SID", grant.sid.as_str())
        .match_header("SEQ", "0")
        .match_header("NT", "upnp:event")
        .match_header("NTS", "upnp:propchange")
        .match_body(Matcher::Regex("<Volume>25</Volume>".to_string()))
        .with_status(200)
        .create();

    device
        .init_notify(handle, UDN, SERVICE, &[("Volume", "25")], &grant.sid)
        .unwrap();
    let report = reports.recv_timeout(WAIT).unwrap();

    assert_eq!(report.outcome, DeliveryOutcome::Delivered);
    mock.assert();
    pool.shutdown();
}
