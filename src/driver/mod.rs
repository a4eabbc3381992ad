//! Purchase drivers: the on-device automation capability.
//!
//! The executor is platform-agnostic and only ever talks to a
//! [`PurchaseDriver`]. [`PlatformDrivers`] routes each call to the driver
//! registered for the device's platform.

pub mod command;

pub use command::CommandDriver;

use crate::config::DriversConfig;
use crate::device::{Device, Platform};
use crate::error::{Result, RushError};
use crate::task::Task;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result of one purchase attempt on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded { note: Option<String> },
    Failed { reason: String },
}

impl AttemptOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self::Succeeded { note: None }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Performs purchase interactions on a device.
///
/// Implementations must tolerate repeated calls for the same task: a retry
/// follows any failed attempt, so a driver that may have purchased silently
/// is expected to verify before buying again.
#[async_trait]
pub trait PurchaseDriver: Send + Sync + 'static {
    /// Run one purchase attempt.
    async fn attempt_purchase(&self, device: &Device, task: &Task) -> AttemptOutcome;

    /// Warm the device up ahead of the start time (launch the app, open the
    /// event page). Best effort.
    async fn prepare(&self, _device: &Device, _task: &Task) -> Result<()> {
        Ok(())
    }

    /// No-op diagnostic confirming the device responds.
    async fn diagnose(&self, device: &Device) -> Result<()>;
}

/// Dispatches to one driver per platform.
#[derive(Clone, Default)]
pub struct PlatformDrivers {
    android: Option<Arc<dyn PurchaseDriver>>,
    ios: Option<Arc<dyn PurchaseDriver>>,
}

impl PlatformDrivers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_driver(mut self, platform: Platform, driver: Arc<dyn PurchaseDriver>) -> Self {
        match platform {
            Platform::Android => self.android = Some(driver),
            Platform::Ios => self.ios = Some(driver),
        }
        self
    }

    /// Build external-command drivers for every platform with a configured
    /// command. Platforms with an empty command stay unsupported.
    #[must_use]
    pub fn from_config(config: &DriversConfig) -> Self {
        let timeout = match config.attempt_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut drivers = Self::new();
        for (platform, section) in [
            (Platform::Android, &config.android),
            (Platform::Ios, &config.ios),
        ] {
            if let Some(driver) = CommandDriver::from_argv(platform, &section.command, timeout) {
                drivers = drivers.with_driver(platform, Arc::new(driver));
            }
        }
        drivers
    }

    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.driver_for(platform).is_some()
    }

    fn driver_for(&self, platform: Platform) -> Option<&Arc<dyn PurchaseDriver>> {
        match platform {
            Platform::Android => self.android.as_ref(),
            Platform::Ios => self.ios.as_ref(),
        }
    }
}

#[async_trait]
impl PurchaseDriver for PlatformDrivers {
    async fn attempt_purchase(&self, device: &Device, task: &Task) -> AttemptOutcome {
        match self.driver_for(device.platform) {
            Some(driver) => driver.attempt_purchase(device, task).await,
            None => AttemptOutcome::failed(format!("no driver for platform {}", device.platform)),
        }
    }

    async fn prepare(&self, device: &Device, task: &Task) -> Result<()> {
        match self.driver_for(device.platform) {
            Some(driver) => driver.prepare(device, task).await,
            None => Ok(()),
        }
    }

    async fn diagnose(&self, device: &Device) -> Result<()> {
        match self.driver_for(device.platform) {
            Some(driver) => driver.diagnose(device).await,
            None => Err(RushError::Attempt(format!(
                "no driver for platform {}",
                device.platform
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::DriverCommandConfig;
    use crate::device::DeviceInfo;
    use crate::task::TaskSpec;

    struct Always(bool);

    #[async_trait]
    impl PurchaseDriver for Always {
        async fn attempt_purchase(&self, _device: &Device, _task: &Task) -> AttemptOutcome {
            if self.0 {
                AttemptOutcome::succeeded()
            } else {
                AttemptOutcome::failed("sold out")
            }
        }

        async fn diagnose(&self, _device: &Device) -> Result<()> {
            Ok(())
        }
    }

    fn device(platform: Platform) -> Device {
        Device::connected("d1", platform, DeviceInfo::unknown())
    }

    fn task() -> Task {
        TaskSpec {
            task_id: None,
            event_name: "e".to_owned(),
            event_url: "https://m.damai.cn/item/1".to_owned(),
            start_time: "2026-01-01T00:00:00Z".to_owned(),
            target_price: None,
            quantity: 1,
            device_ids: vec!["d1".to_owned()],
        }
        .into_task(6)
        .unwrap()
    }

    #[tokio::test]
    async fn dispatches_by_platform() {
        let drivers = PlatformDrivers::new()
            .with_driver(Platform::Android, Arc::new(Always(true)))
            .with_driver(Platform::Ios, Arc::new(Always(false)));

        assert_eq!(
            drivers
                .attempt_purchase(&device(Platform::Android), &task())
                .await,
            AttemptOutcome::succeeded()
        );
        assert_eq!(
            drivers
                .attempt_purchase(&device(Platform::Ios), &task())
                .await,
            AttemptOutcome::failed("sold out")
        );
    }

    #[tokio::test]
    async fn missing_platform_fails_attempts_and_diagnostics() {
        let drivers = PlatformDrivers::new().with_driver(Platform::Android, Arc::new(Always(true)));
        let ios = device(Platform::Ios);

        assert!(!drivers.supports(Platform::Ios));
        assert_eq!(
            drivers.attempt_purchase(&ios, &task()).await,
            AttemptOutcome::failed("no driver for platform ios")
        );
        assert!(drivers.diagnose(&ios).await.is_err());
        assert!(drivers.prepare(&ios, &task()).await.is_ok());
    }

    #[test]
    fn empty_commands_leave_platforms_unsupported() {
        let config = DriversConfig {
            android: DriverCommandConfig {
                command: vec!["rush-android".to_owned()],
            },
            ios: DriverCommandConfig::default(),
            attempt_timeout_secs: 0,
        };
        let drivers = PlatformDrivers::from_config(&config);
        assert!(drivers.supports(Platform::Android));
        assert!(!drivers.supports(Platform::Ios));
    }
}
