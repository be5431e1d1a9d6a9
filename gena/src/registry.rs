//! Device handles and their service tables

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{GenaError, Result};
use crate::subscription::Subscription;

/// Handle returned by [`GenaDevice::register_device`](crate::GenaDevice::register_device)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A service a device exposes for eventing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDesc {
    /// UDN of the (embedded) device the service belongs to
    pub udn: String,
    pub service_id: String,
    pub service_type: String,
}

impl ServiceDesc {
    pub fn new(
        udn: impl Into<String>,
        service_id: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            udn: udn.into(),
            service_id: service_id.into(),
            service_type: service_type.into(),
        }
    }
}

/// Everything needed to register a device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    pub services: Vec<ServiceDesc>,
    /// Subscriptions allowed per service, `None` for no limit
    pub max_subscriptions: Option<usize>,
    /// Longest subscription granted, `None` for no limit
    pub max_subscription_timeout: Option<Duration>,
}

impl DeviceConfig {
    pub fn new(services: Vec<ServiceDesc>) -> Self {
        Self {
            services,
            ..Default::default()
        }
    }

    pub fn with_max_subscriptions(mut self, limit: usize) -> Self {
        self.max_subscriptions = Some(limit);
        self
    }

    pub fn with_max_subscription_timeout(mut self, limit: Duration) -> Self {
        self.max_subscription_timeout = Some(limit);
        self
    }

    /// Apply the device limit to a requested timeout, `None` meaning infinite
    pub(crate) fn clamp_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        match (requested, self.max_subscription_timeout) {
            (_, None) => requested,
            (None, Some(max)) => Some(max),
            (Some(t), Some(max)) => Some(t.min(max)),
        }
    }
}

/// Eventing state of one service
#[derive(Debug)]
pub struct ServiceInfo {
    desc: ServiceDesc,
    subscriptions: Vec<Subscription>,
}

impl ServiceInfo {
    fn new(desc: ServiceDesc) -> Self {
        Self {
            desc,
            subscriptions: Vec::new(),
        }
    }

    pub fn desc(&self) -> &ServiceDesc {
        &self.desc
    }

    /// Subscriptions currently held, expired ones included until swept
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Live subscription with this SID; an expired match is removed
    pub(crate) fn subscription_mut(&mut self, sid: &str) -> Option<&mut Subscription> {
        let index = self.subscriptions.iter().position(|s| s.sid() == sid)?;
        if self.subscriptions[index].is_expired(Instant::now()) {
            debug!("Subscription {} expired", sid);
            self.subscriptions.remove(index);
            return None;
        }
        self.subscriptions.get_mut(index)
    }

    /// Remove a subscription, dropping every notification still queued for it
    pub(crate) fn remove_subscription(&mut self, sid: &str) -> Option<Subscription> {
        let index = self.subscriptions.iter().position(|s| s.sid() == sid)?;
        Some(self.subscriptions.remove(index))
    }

    /// Active, unexpired subscriptions; expired ones are removed on the way
    pub(crate) fn active_subscriptions_mut(&mut self) -> impl Iterator<Item = &mut Subscription> {
        self.remove_expired();
        self.subscriptions.iter_mut().filter(|s| s.is_active())
    }

    pub(crate) fn remove_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| !s.is_expired(now));
        before - self.subscriptions.len()
    }
}

/// Services of one registered device
#[derive(Debug)]
pub struct ServiceTable {
    services: Vec<ServiceInfo>,
}

impl ServiceTable {
    pub(crate) fn new(services: Vec<ServiceDesc>) -> Self {
        Self {
            services: services.into_iter().map(ServiceInfo::new).collect(),
        }
    }

    pub fn find_service(&self, service_id: &str, udn: &str) -> Option<&ServiceInfo> {
        self.services
            .iter()
            .find(|s| s.desc.service_id == service_id && s.desc.udn == udn)
    }

    pub(crate) fn find_service_mut(&mut self, service_id: &str, udn: &str) -> Option<&mut ServiceInfo> {
        self.services
            .iter_mut()
            .find(|s| s.desc.service_id == service_id && s.desc.udn == udn)
    }

    pub(crate) fn services_mut(&mut self) -> impl Iterator<Item = &mut ServiceInfo> {
        self.services.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// A registered device
#[derive(Debug)]
pub(crate) struct DeviceInfo {
    pub(crate) config: DeviceConfig,
    pub(crate) services: ServiceTable,
}

/// Handle table for registered devices
#[derive(Debug, Default)]
pub(crate) struct DeviceRegistry {
    devices: HashMap<DeviceHandle, DeviceInfo>,
    last_handle: u32,
}

impl DeviceRegistry {
    pub(crate) fn register(&mut self, config: DeviceConfig) -> DeviceHandle {
        self.last_handle += 1;
        let handle = DeviceHandle::from_raw(self.last_handle);
        let services = ServiceTable::new(config.services.clone());
        self.devices.insert(handle, DeviceInfo { config, services });
        handle
    }

    pub(crate) fn unregister(&mut self, handle: DeviceHandle) -> Result<DeviceInfo> {
        self.devices.remove(&handle).ok_or(GenaError::BadHandle(handle))
    }

    pub(crate) fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut DeviceInfo> {
        self.devices.get_mut(&handle).ok_or(GenaError::BadHandle(handle))
    }

    pub(crate) fn device(&self, handle: DeviceHandle) -> Result<&DeviceInfo> {
        self.devices.get(&handle).ok_or(GenaError::BadHandle(handle))
    }

    pub(crate) fn service_mut(
        &mut self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
    ) -> Result<&mut ServiceInfo> {
        self.device_mut(handle)?
            .services
            .find_service_mut(service_id, udn)
            .ok_or_else(|| GenaError::BadService {
                udn: udn.to_string(),
                service_id: service_id.to_string(),
            })
    }

    /// Live subscription addressed by device, service and SID
    pub(crate) fn subscription_mut(
        &mut self,
        handle: DeviceHandle,
        udn: &str,
        service_id: &str,
        sid: &str,
    ) -> Option<&mut Subscription> {
        self.service_mut(handle, udn, service_id)
            .ok()?
            .subscription_mut(sid)
    }

    pub(crate) fn devices_mut(&mut self) -> impl Iterator<Item = &mut DeviceInfo> {
        self.devices.values_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<DeviceInfo> {
        self.devices.drain().map(|(_, device)| device).collect()
    }
}
