//! Authoritative set of known devices and their connection state.
//!
//! Transport I/O (scan, connect, liveness probes) always runs outside the
//! record lock, so a slow connect on one phone never stalls liveness reads
//! for another. Records are kept in insertion order and are never removed;
//! a lost device is only marked disconnected.

use crate::device::transport::DeviceTransport;
use crate::device::types::{ConnectionState, Device, Platform, ScanResult};
use crate::error::{Result, RushError};
use crate::events::{EventSender, RushEvent};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

pub struct DeviceRegistry {
    transport: Arc<dyn DeviceTransport>,
    devices: RwLock<Vec<Device>>,
    events: EventSender,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceTransport>, events: EventSender) -> Self {
        Self {
            transport,
            devices: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Discover candidate identifiers on both platforms.
    ///
    /// A failing platform tool is logged and reported as an empty list.
    pub async fn scan(&self) -> ScanResult {
        ScanResult {
            android: self.scan_platform(Platform::Android).await,
            ios: self.scan_platform(Platform::Ios).await,
        }
    }

    async fn scan_platform(&self, platform: Platform) -> Vec<String> {
        match self.transport.scan(platform).await {
            Ok(ids) => {
                info!(%platform, count = ids.len(), "device scan complete");
                ids
            }
            Err(e) => {
                warn!(%platform, "device scan failed: {e}");
                Vec::new()
            }
        }
    }

    /// Connect a device, inserting or refreshing its record.
    pub async fn connect(&self, device_id: &str, platform: Platform) -> Result<Device> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RushError::Validation("device_id cannot be empty".to_owned()));
        }

        let info = self.transport.connect(device_id, platform).await.map_err(|e| {
            warn!(device_id, %platform, "device connect failed: {e}");
            match e {
                RushError::Connection(_) => e,
                other => RushError::Connection(other.to_string()),
            }
        })?;

        let device = Device::connected(device_id, platform, info);
        {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = devices.iter_mut().find(|d| d.device_id == device_id) {
                *existing = device.clone();
            } else {
                devices.push(device.clone());
            }
        }

        info!(device_id, %platform, model = %device.model, "device connected");
        let _ = self.events.send(RushEvent::DeviceConnected {
            device_id: device_id.to_owned(),
            platform,
        });
        Ok(device)
    }

    /// All known devices in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Device> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<Device> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    /// Returns `true` when a record exists, connected or not.
    #[must_use]
    pub fn contains(&self, device_id: &str) -> bool {
        self.get(device_id).is_some()
    }

    /// Liveness check run immediately before an attempt.
    ///
    /// A connected device that fails the transport probe is marked
    /// disconnected on the way out, unless it was reconnected while the
    /// probe ran.
    pub async fn is_live(&self, device_id: &str) -> bool {
        let Some(device) = self.get(device_id) else {
            return false;
        };
        if !device.is_connected() {
            return false;
        }

        if self.transport.is_alive(device_id, device.platform).await {
            return true;
        }

        warn!(device_id, "device lost liveness");
        self.mark_disconnected(device_id, Some(device.connected_at));
        false
    }

    /// Mark a device disconnected and release its transport session.
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        let device = self
            .get(device_id)
            .ok_or_else(|| RushError::NotFound(format!("device {device_id}")))?;

        if let Err(e) = self.transport.disconnect(device_id, device.platform).await {
            warn!(device_id, "transport disconnect failed: {e}");
        }
        self.mark_disconnected(device_id, None);
        Ok(())
    }

    /// Disconnect every connected device.
    pub async fn disconnect_all(&self) {
        let connected: Vec<String> = self
            .list()
            .into_iter()
            .filter(Device::is_connected)
            .map(|d| d.device_id)
            .collect();
        for device_id in connected {
            let _ = self.disconnect(&device_id).await;
        }
        info!("all devices disconnected");
    }

    /// `session` limits the change to the connection observed by a probe.
    fn mark_disconnected(&self, device_id: &str, session: Option<DateTime<Utc>>) {
        let changed = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            match devices.iter_mut().find(|d| d.device_id == device_id) {
                Some(device)
                    if device.is_connected()
                        && session.is_none_or(|at| at == device.connected_at) =>
                {
                    device.connection_state = ConnectionState::Disconnected;
                    true
                }
                _ => false,
            }
        };

        if changed {
            info!(device_id, "device disconnected");
            let _ = self.events.send(RushEvent::DeviceDisconnected {
                device_id: device_id.to_owned(),
            });
        }
    }
}
