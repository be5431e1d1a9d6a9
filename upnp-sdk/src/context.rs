//! The SDK context
//!
//! Owns the send and receive pools, the timer thread and the device eventing
//! state. Everything is passed around by reference to the context; there is
//! no process-wide state.

use std::sync::Arc;
use std::time::Duration;

use gena::{
    DeliveryReports, DeviceHandle, GenaDevice, NotifyTransport, ServiceDesc,
};
use notify_client::NotifyClient;
use parking_lot::Mutex;
use threadutil::{
    Job, Persistence, Priority, ThreadPool, ThreadPoolStats, Timeout, TimerError, TimerThread,
};
use tracing::{debug, info};

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    ShutDown,
}

/// Running SDK instance
///
/// # Example
///
/// ```rust,no_run
/// use upnp_sdk::{SdkConfig, ServiceDesc, UpnpContext};
///
/// let context = UpnpContext::new(SdkConfig::default())?;
/// let handle = context.register_device(vec![ServiceDesc::new(
///     "uuid:renderer",
///     "urn:upnp-org:serviceId:AVTransport",
///     "urn:schemas-upnp-org:service:AVTransport:1",
/// )])?;
///
/// let events = context.gena();
/// events.notify_all(
///     handle,
///     "uuid:renderer",
///     "urn:upnp-org:serviceId:AVTransport",
///     &[("TransportState", "PLAYING")],
/// )?;
///
/// context.shutdown();
/// # Ok::<(), upnp_sdk::SdkError>(())
/// ```
pub struct UpnpContext {
    config: SdkConfig,
    send_pool: ThreadPool,
    recv_pool: ThreadPool,
    timer: TimerThread,
    gena: GenaDevice,
    reports: DeliveryReports,
    lifecycle: Mutex<Lifecycle>,
}

impl UpnpContext {
    /// Start the pools and timer, delivering NOTIFY requests over HTTP
    pub fn new(config: SdkConfig) -> Result<Self> {
        let client = NotifyClient::with_timeouts(
            Duration::from_secs(config.notify_connect_timeout_secs),
            Duration::from_secs(config.notify_read_timeout_secs),
        );
        Self::with_transport(config, Arc::new(client))
    }

    /// Start the context with a custom NOTIFY transport
    pub fn with_transport(config: SdkConfig, transport: Arc<dyn NotifyTransport>) -> Result<Self> {
        config.validate()?;

        let send_pool = ThreadPool::new(config.send_pool.to_attr())?;
        let recv_pool = match ThreadPool::new(config.recv_pool.to_attr()) {
            Ok(pool) => pool,
            Err(e) => {
                send_pool.shutdown();
                return Err(e.into());
            }
        };

        let started = TimerThread::new(&send_pool)
            .map_err(SdkError::from)
            .and_then(|timer| {
                let (gena, reports) = GenaDevice::with_report_capacity(
                    send_pool.clone(),
                    transport,
                    config.queue_limits(),
                    config.report_buffer_size,
                )
                .map_err(|e| {
                    timer.shutdown();
                    SdkError::from(e)
                })?;
                Ok((timer, gena, reports))
            });
        let (timer, gena, reports) = match started {
            Ok(parts) => parts,
            Err(e) => {
                recv_pool.shutdown();
                send_pool.shutdown();
                return Err(e);
            }
        };

        if let Some(interval) = config.expiry_sweep() {
            if let Err(e) = schedule_expiry_sweep(timer.clone(), gena.clone(), interval) {
                timer.shutdown();
                recv_pool.shutdown();
                send_pool.shutdown();
                return Err(e.into());
            }
        }

        info!(
            "UPnP context started (send pool {:?}, recv pool {:?} threads max)",
            config.send_pool.max_threads, config.recv_pool.max_threads
        );

        Ok(Self {
            config,
            send_pool,
            recv_pool,
            timer,
            gena,
            reports,
            lifecycle: Mutex::new(Lifecycle::Running),
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Pool running notification and timer jobs
    pub fn send_pool(&self) -> &ThreadPool {
        &self.send_pool
    }

    /// Pool for request handling work
    pub fn recv_pool(&self) -> &ThreadPool {
        &self.recv_pool
    }

    pub fn timer(&self) -> &TimerThread {
        &self.timer
    }

    pub fn gena(&self) -> &GenaDevice {
        &self.gena
    }

    /// Delivery reports of every notification sent through this context
    pub fn reports(&self) -> DeliveryReports {
        self.reports.clone()
    }

    /// Register a device with the configured subscription limits
    pub fn register_device(&self, services: Vec<ServiceDesc>) -> Result<DeviceHandle> {
        if self.is_shut_down() {
            return Err(SdkError::ShutDown);
        }
        Ok(self.gena.register_device(self.config.device_config(services)))
    }

    pub fn send_pool_stats(&self) -> ThreadPoolStats {
        self.send_pool.stats()
    }

    pub fn recv_pool_stats(&self) -> ThreadPoolStats {
        self.recv_pool.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::ShutDown
    }

    /// Stop the timer, drop every device, then stop the pools
    ///
    /// Must not be called from a pool job. Calling it more than once is a no-op.
    pub fn shutdown(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::ShutDown {
                return;
            }
            *lifecycle = Lifecycle::ShutDown;
        }

        self.timer.shutdown();
        let devices = self.gena.unregister_all();
        debug!("Unregistered {} devices", devices);
        self.recv_pool.shutdown();
        self.send_pool.shutdown();

        info!("UPnP context shut down");
    }
}

impl Drop for UpnpContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for UpnpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpnpContext")
            .field("lifecycle", &*self.lifecycle.lock())
            .field("send_pool", &self.send_pool)
            .field("recv_pool", &self.recv_pool)
            .finish_non_exhaustive()
    }
}

/// Sweep expired subscriptions every `interval`, rescheduling itself until
/// the timer shuts down
fn schedule_expiry_sweep(
    timer: TimerThread,
    gena: GenaDevice,
    interval: Duration,
) -> std::result::Result<(), TimerError> {
    let next = timer.clone();
    let job = Job::new(move || {
        gena.expire_subscriptions();
        if let Err(e) = schedule_expiry_sweep(next, gena, interval) {
            debug!("Subscription sweep stopped: {}", e);
        }
    })
    .with_priority(Priority::Low);

    timer.schedule(Timeout::Relative(interval), job, Persistence::ShortTerm)?;
    Ok(())
}
