//! Control API: the command/query surface for the presentation layer.
//!
//! [`RushEngine`] wires the device registry, task store, executor and
//! scheduler together over one event bus. Validation and lookup errors are
//! returned synchronously; attempt outcomes only ever show up as task state.

use crate::config::RushConfig;
use crate::device::{
    CommandLineTransport, Device, DeviceRegistry, DeviceTransport, Platform, ScanResult,
};
use crate::driver::{PlatformDrivers, PurchaseDriver};
use crate::error::{Result, RushError};
use crate::events::{EventSender, RushEvent, event_bus};
use crate::executor::{Executor, RetryPolicy};
use crate::scheduler::Scheduler;
use crate::task::{Task, TaskSpec, TaskStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a device diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct RushEngine {
    config: RushConfig,
    events: EventSender,
    registry: Arc<DeviceRegistry>,
    store: Arc<TaskStore>,
    driver: Arc<dyn PurchaseDriver>,
    scheduler: Scheduler,
}

impl RushEngine {
    /// Build an engine over explicit transport and driver implementations.
    pub fn new(
        config: RushConfig,
        transport: Arc<dyn DeviceTransport>,
        driver: Arc<dyn PurchaseDriver>,
    ) -> Result<Self> {
        config.validate()?;

        let events = event_bus(config.host.event_capacity);
        let registry = Arc::new(DeviceRegistry::new(transport, events.clone()));
        let store = Arc::new(TaskStore::new(
            config.policy.success,
            &config.limits,
            events.clone(),
        ));
        let executor = Executor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&driver),
            RetryPolicy::from(&config.retry),
        );
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            executor,
            Arc::clone(&driver),
        )
        .with_config(&config.scheduler);

        Ok(Self {
            config,
            events,
            registry,
            store,
            driver,
            scheduler,
        })
    }

    /// Build an engine over the command-line transport and the configured
    /// automation commands.
    pub fn from_config(config: RushConfig) -> Result<Self> {
        let transport = Arc::new(CommandLineTransport::new(config.transport.clone()));
        let driver = PlatformDrivers::from_config(&config.drivers);
        for platform in [Platform::Android, Platform::Ios] {
            if !driver.supports(platform) {
                warn!(%platform, "no automation command configured; attempts on this platform will fail");
            }
        }
        let driver = Arc::new(driver);
        Self::new(config, transport, driver)
    }

    #[must_use]
    pub fn config(&self) -> &RushConfig {
        &self.config
    }

    /// Restore persisted tasks, if a snapshot path is configured.
    pub fn load_state(&self) -> Result<usize> {
        self.scheduler.load_state()
    }

    /// Start the scheduling loop.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.scheduler.clone().run(cancel)
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RushEvent> {
        self.events.subscribe()
    }

    pub async fn scan_devices(&self) -> ScanResult {
        self.registry.scan().await
    }

    pub async fn connect_device(&self, device_id: &str, platform: Platform) -> Result<Device> {
        self.registry.connect(device_id, platform).await
    }

    #[must_use]
    pub fn list_devices(&self) -> Vec<Device> {
        self.registry.list()
    }

    pub async fn disconnect_device(&self, device_id: &str) -> Result<()> {
        self.registry.disconnect(device_id).await
    }

    /// Validate and store a new pending task.
    ///
    /// Every device must be known to the registry now; it may be offline by
    /// the time the task runs.
    pub fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        if let Some(unknown) = spec
            .device_ids
            .iter()
            .map(|id| id.trim())
            .find(|id| !id.is_empty() && !self.registry.contains(id))
        {
            return Err(RushError::Validation(format!("unknown device {unknown}")));
        }
        self.store.create(spec)
    }

    #[must_use]
    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list()
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store.get(task_id)
    }

    /// Fire a pending task now instead of waiting for its start time.
    pub fn start_task(&self, task_id: &str) -> Result<()> {
        self.scheduler.fire(task_id).map(|_| ())
    }

    pub fn stop_task(&self, task_id: &str) -> Result<()> {
        self.store.stop(task_id)?;
        info!(task_id, "task stopped");
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> Result<()> {
        self.store.delete(task_id)
    }

    /// Run the driver's no-op diagnostic against a device.
    pub async fn test_device(&self, device_id: &str) -> Result<TestReport> {
        let device = self
            .registry
            .get(device_id)
            .ok_or_else(|| RushError::NotFound(format!("device {device_id}")))?;

        if !self.registry.is_live(device_id).await {
            return Ok(TestReport {
                success: false,
                reason: Some("device unavailable".to_owned()),
            });
        }

        let report = match self.driver.diagnose(&device).await {
            Ok(()) => TestReport {
                success: true,
                reason: None,
            },
            Err(e) => TestReport {
                success: false,
                reason: Some(e.to_string()),
            },
        };
        info!(device_id, success = report.success, "device test finished");
        Ok(report)
    }

    /// Release every device session.
    pub async fn shutdown(&self) {
        self.registry.disconnect_all().await;
    }
}
