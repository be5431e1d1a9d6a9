//! # UPnP SDK
//!
//! Core runtime of a UPnP device stack: priority thread pools, a timer
//! thread, and GENA event delivery to subscribed control points.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upnp_sdk::{logging, SdkConfig, UpnpContext};
//!
//! let config = SdkConfig::from_json(r#"{ "max_event_queue": 20, "logging": "development" }"#)?;
//! logging::init_logging(config.logging)?;
//!
//! let context = UpnpContext::new(config)?;
//! for report in context.reports() {
//!     println!("{} SEQ {}: {:?}", report.sid, report.seq, report.outcome);
//! }
//! # Ok::<(), upnp_sdk::SdkError>(())
//! ```
//!
//! ## Crates
//!
//! - [`threadutil`]: thread pool, timer thread, linked list and free list
//! - [`gena`]: device handles, subscriptions and ordered NOTIFY delivery
//! - [`notify_client`]: the blocking HTTP client NOTIFY requests go out on

pub mod config;
pub mod context;
pub mod error;
pub mod logging;

pub use config::{PoolConfig, PoolPolicy, SdkConfig};
pub use context::UpnpContext;
pub use error::{Result, SdkError};
pub use logging::{LoggingError, LoggingMode};

pub use gena::{
    DeliveryOutcome, DeliveryReport, DeliveryReports, DeviceConfig, DeviceHandle,
    EventQueueLimits, GenaDevice, GenaError, NotifyPayload, NotifyTransport, ServiceDesc,
    SubscriptionGrant,
};
pub use threadutil::{
    Job, JobId, Persistence, Priority, ThreadPool, ThreadPoolAttr, ThreadPoolError,
    ThreadPoolStats, Timeout, TimerError, TimerThread,
};

pub use gena;
pub use notify_client;
pub use threadutil;
