//! # GENA device eventing
//!
//! Device-side half of the General Event Notification Architecture: a table
//! of registered devices and their evented services, the subscriptions
//! control points hold on them, and the ordered delivery of NOTIFY requests.
//!
//! ## Delivery model
//!
//! Each event becomes one shared [`NotifyPayload`] and one job per active
//! subscription. A subscription only ever has its queue head with the send
//! pool; when that job completes the event key advances and the next entry
//! is submitted. Long queues are pruned of stale or surplus entries before
//! each append, never touching the in-flight head.
//!
//! Outcomes are published as [`DeliveryReport`]s:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gena::{DeviceConfig, EventQueueLimits, GenaDevice, ServiceDesc};
//! use notify_client::NotifyClient;
//! use threadutil::{ThreadPool, ThreadPoolAttr};
//!
//! let pool = ThreadPool::new(ThreadPoolAttr::default())?;
//! let (device, reports) = GenaDevice::new(
//!     pool.clone(),
//!     Arc::new(NotifyClient::new()),
//!     EventQueueLimits::default(),
//! )?;
//!
//! let handle = device.register_device(DeviceConfig::new(vec![ServiceDesc::new(
//!     "uuid:renderer",
//!     "urn:upnp-org:serviceId:RenderingControl",
//!     "urn:schemas-upnp-org:service:RenderingControl:1",
//! )]));
//! let grant = device.subscribe(
//!     handle,
//!     "uuid:renderer",
//!     "urn:upnp-org:serviceId:RenderingControl",
//!     "<http://192.168.1.20:3400/notify>",
//!     None,
//! )?;
//! device.init_notify(
//!     handle,
//!     "uuid:renderer",
//!     "urn:upnp-org:serviceId:RenderingControl",
//!     &[("Volume", "20")],
//!     &grant.sid,
//! )?;
//!
//! for report in reports.take(1) {
//!     println!("{} SEQ {}: {:?}", report.sid, report.seq, report.outcome);
//! }
//! pool.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod payload;
pub mod registry;
pub mod reports;
pub mod subscription;
pub mod transport;

pub use device::{GenaDevice, SubscriptionGrant, DEFAULT_REPORT_CAPACITY};
pub use error::{GenaError, Result};
pub use payload::{property_set, NotifyPayload};
pub use registry::{DeviceConfig, DeviceHandle, ServiceDesc, ServiceInfo, ServiceTable};
pub use reports::{DeliveryOutcome, DeliveryReport, DeliveryReports};
pub use subscription::{parse_delivery_urls, EventQueueLimits, Subscription};
pub use transport::NotifyTransport;
