//! Configuration types for the SDK context
//!
//! Durations are stored as whole milliseconds or seconds so the whole
//! configuration round-trips through JSON. Missing fields take their
//! defaults.

use std::time::Duration;

use gena::{DeviceConfig, EventQueueLimits, ServiceDesc};
use serde::{Deserialize, Serialize};
use threadutil::{SchedPolicy, ThreadPoolAttr};

use crate::error::{Result, SdkError};
use crate::logging::LoggingMode;

/// Scheduling policy as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPolicy {
    #[default]
    Other,
    Fifo,
    RoundRobin,
}

impl From<PoolPolicy> for SchedPolicy {
    fn from(policy: PoolPolicy) -> Self {
        match policy {
            PoolPolicy::Other => SchedPolicy::Other,
            PoolPolicy::Fifo => SchedPolicy::Fifo,
            PoolPolicy::RoundRobin => SchedPolicy::RoundRobin,
        }
    }
}

/// Sizing and aging of one thread pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers kept alive even when idle
    /// Default: 2
    pub min_threads: usize,

    /// Upper bound on workers, `null` for unbounded
    /// Default: 12
    pub max_threads: Option<usize>,

    /// Worker stack size in bytes, 0 for the OS default
    /// Default: 0
    pub stack_size: usize,

    /// Idle time before a surplus worker exits
    /// Default: 5000 ms
    pub max_idle_time_ms: u64,

    /// Queued jobs per worker above which the pool grows
    /// Default: 10
    pub jobs_per_thread: usize,

    /// Queued jobs above which submissions are refused
    /// Default: 100
    pub max_jobs_total: usize,

    /// Wait before a medium priority job is promoted
    /// Default: 500 ms
    pub starvation_time_ms: u64,

    /// Default: other
    pub sched_policy: PoolPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 2,
            max_threads: Some(12),
            stack_size: 0,
            max_idle_time_ms: 5_000,
            jobs_per_thread: 10,
            max_jobs_total: 100,
            starvation_time_ms: 500,
            sched_policy: PoolPolicy::Other,
        }
    }
}

impl PoolConfig {
    /// Pool attributes described by this configuration
    pub fn to_attr(&self) -> ThreadPoolAttr {
        ThreadPoolAttr {
            min_threads: self.min_threads,
            max_threads: self.max_threads,
            stack_size: self.stack_size,
            max_idle_time: Duration::from_millis(self.max_idle_time_ms),
            jobs_per_thread: self.jobs_per_thread,
            max_jobs_total: self.max_jobs_total,
            starvation_time: Duration::from_millis(self.starvation_time_ms),
            sched_policy: self.sched_policy.into(),
        }
    }
}

/// Configuration for an [`UpnpContext`](crate::UpnpContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Pool running NOTIFY delivery and timer jobs
    pub send_pool: PoolConfig,

    /// Pool available to request handlers
    pub recv_pool: PoolConfig,

    /// Queue length at which the oldest waiting notification is dropped
    /// Default: 10
    pub max_event_queue: usize,

    /// Age past which a waiting notification is dropped
    /// Default: 30 seconds
    pub max_event_age_secs: u64,

    /// Subscriptions allowed per service, `null` for no limit
    /// Default: none
    pub max_subscriptions: Option<usize>,

    /// Longest subscription granted, `null` for no limit
    /// Default: none
    pub max_subscription_timeout_secs: Option<u64>,

    /// Unread delivery reports kept before new ones are dropped
    /// Default: 1000
    pub report_buffer_size: usize,

    /// Interval of the expired-subscription sweep, 0 to disable it
    /// Default: 60 seconds
    pub expiry_sweep_secs: u64,

    /// Connect timeout of NOTIFY requests
    /// Default: 30 seconds
    pub notify_connect_timeout_secs: u64,

    /// Read timeout of NOTIFY requests
    /// Default: 30 seconds
    pub notify_read_timeout_secs: u64,

    /// Default: silent
    pub logging: LoggingMode,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            send_pool: PoolConfig::default(),
            recv_pool: PoolConfig::default(),
            max_event_queue: 10,
            max_event_age_secs: 30,
            max_subscriptions: None,
            max_subscription_timeout_secs: None,
            report_buffer_size: gena::DEFAULT_REPORT_CAPACITY,
            expiry_sweep_secs: 60,
            notify_connect_timeout_secs: notify_client::DEFAULT_TIMEOUT.as_secs(),
            notify_read_timeout_secs: notify_client::DEFAULT_TIMEOUT.as_secs(),
            logging: LoggingMode::Silent,
        }
    }
}

impl SdkConfig {
    /// Create a new SdkConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an SdkConfig for constrained hosts
    pub fn low_footprint() -> Self {
        let pool = PoolConfig {
            min_threads: 1,
            max_threads: Some(4),
            max_jobs_total: 50,
            ..Default::default()
        };

        Self {
            send_pool: pool.clone(),
            recv_pool: pool,
            max_event_queue: 5,
            max_subscriptions: Some(16),
            report_buffer_size: 100,
            ..Default::default()
        }
    }

    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration and return the first issue found
    pub fn validate(&self) -> Result<()> {
        for (name, pool) in [("send_pool", &self.send_pool), ("recv_pool", &self.recv_pool)] {
            pool.to_attr()
                .validate()
                .map_err(|e| SdkError::Configuration(format!("{}: {}", name, e)))?;
        }

        if self.send_pool.max_threads.map_or(false, |max| max < 2) {
            return Err(SdkError::Configuration(
                "send_pool needs at least 2 threads: one is held by the timer".to_string(),
            ));
        }

        if self.max_event_queue < 2 {
            return Err(SdkError::Configuration(
                "Max event queue must be at least 2".to_string(),
            ));
        }

        if self.report_buffer_size == 0 {
            return Err(SdkError::Configuration(
                "Report buffer size must be greater than 0".to_string(),
            ));
        }

        if self.max_subscriptions == Some(0) {
            return Err(SdkError::Configuration(
                "Max subscriptions must be greater than 0".to_string(),
            ));
        }

        if self.notify_connect_timeout_secs == 0 || self.notify_read_timeout_secs == 0 {
            return Err(SdkError::Configuration(
                "NOTIFY timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn queue_limits(&self) -> EventQueueLimits {
        EventQueueLimits {
            max_len: self.max_event_queue,
            max_age: Duration::from_secs(self.max_event_age_secs),
        }
    }

    /// Device registration carrying the configured subscription limits
    pub fn device_config(&self, services: Vec<ServiceDesc>) -> DeviceConfig {
        let mut config = DeviceConfig::new(services);
        if let Some(limit) = self.max_subscriptions {
            config = config.with_max_subscriptions(limit);
        }
        if let Some(secs) = self.max_subscription_timeout_secs {
            config = config.with_max_subscription_timeout(Duration::from_secs(secs));
        }
        config
    }

    pub(crate) fn expiry_sweep(&self) -> Option<Duration> {
        (self.expiry_sweep_secs > 0).then(|| Duration::from_secs(self.expiry_sweep_secs))
    }
}
