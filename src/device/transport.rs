//! Device discovery and session transport.
//!
//! [`DeviceTransport`] is the seam between the registry and however phones
//! are physically reached. [`CommandLineTransport`] drives the platform
//! tools directly: `adb` for Android and libimobiledevice
//! (`idevice_id`, `ideviceinfo`) for iOS.

use crate::config::TransportConfig;
use crate::device::types::{DeviceInfo, Platform, UNKNOWN};
use crate::error::{Result, RushError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Enumerates, connects and probes devices for one or more platforms.
#[async_trait]
pub trait DeviceTransport: Send + Sync + 'static {
    /// List identifiers of attached devices. Must not alter any stored state.
    async fn scan(&self, platform: Platform) -> Result<Vec<String>>;

    /// Open a session and report display metadata.
    async fn connect(&self, device_id: &str, platform: Platform) -> Result<DeviceInfo>;

    /// Best-effort liveness probe.
    async fn is_alive(&self, device_id: &str, platform: Platform) -> bool;

    /// Release any session state held for the device.
    async fn disconnect(&self, _device_id: &str, _platform: Platform) -> Result<()> {
        Ok(())
    }
}

/// Transport backed by `adb` and libimobiledevice command-line tools.
pub struct CommandLineTransport {
    config: TransportConfig,
}

impl CommandLineTransport {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs.max(1))
    }

    async fn adb(&self, args: &[&str]) -> Result<String> {
        run_tool(&self.config.adb_path, args, self.timeout()).await
    }

    async fn adb_prop(&self, device_id: &str, prop: &str) -> String {
        match self.adb(&["-s", device_id, "shell", "getprop", prop]).await {
            Ok(out) => non_empty_or_unknown(&out),
            Err(e) => {
                debug!(device_id, prop, "getprop failed: {e}");
                UNKNOWN.to_owned()
            }
        }
    }

    async fn ios_prop(&self, device_id: &str, key: &str) -> String {
        match run_tool(
            &self.config.ideviceinfo_path,
            &["-u", device_id, "-k", key],
            self.timeout(),
        )
        .await
        {
            Ok(out) => non_empty_or_unknown(&out),
            Err(e) => {
                debug!(device_id, key, "ideviceinfo failed: {e}");
                UNKNOWN.to_owned()
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for CommandLineTransport {
    async fn scan(&self, platform: Platform) -> Result<Vec<String>> {
        match platform {
            Platform::Android => Ok(parse_adb_devices(&self.adb(&["devices"]).await?)),
            Platform::Ios => {
                let out = run_tool(&self.config.idevice_id_path, &["-l"], self.timeout()).await?;
                Ok(parse_idevice_list(&out))
            }
        }
    }

    async fn connect(&self, device_id: &str, platform: Platform) -> Result<DeviceInfo> {
        if !self.is_alive(device_id, platform).await {
            return Err(RushError::Connection(format!(
                "{platform} device {device_id} is not attached"
            )));
        }

        match platform {
            Platform::Android => Ok(DeviceInfo {
                brand: self.adb_prop(device_id, "ro.product.brand").await,
                model: self.adb_prop(device_id, "ro.product.model").await,
                os_version: self.adb_prop(device_id, "ro.build.version.release").await,
            }),
            Platform::Ios => Ok(DeviceInfo {
                brand: "Apple".to_owned(),
                model: self.ios_prop(device_id, "ProductType").await,
                os_version: self.ios_prop(device_id, "ProductVersion").await,
            }),
        }
    }

    async fn is_alive(&self, device_id: &str, platform: Platform) -> bool {
        match platform {
            Platform::Android => match self.adb(&["-s", device_id, "get-state"]).await {
                Ok(state) => state.trim() == "device",
                Err(_) => false,
            },
            Platform::Ios => match self.scan(Platform::Ios).await {
                Ok(ids) => ids.iter().any(|id| id == device_id),
                Err(_) => false,
            },
        }
    }
}

/// Run a discovery tool and return its stdout.
async fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let resolved = which::which(program)
        .map_err(|_| RushError::Connection(format!("{program} is not installed")))?;

    let mut command = Command::new(resolved);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            RushError::Connection(format!("{program} timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|e| RushError::Connection(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RushError::Connection(format!(
            "{program} {} failed ({}): {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `adb devices` output, keeping only authorized devices.
fn parse_adb_devices(output: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for line in output.lines().skip(1) {
        let mut cols = line.split('\t');
        let (Some(id), Some(state)) = (cols.next(), cols.next()) else {
            continue;
        };
        let id = id.trim();
        if state.trim() == "device" && !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_owned());
        }
    }
    ids
}

/// Parse `idevice_id -l` output (one UDID per line).
fn parse_idevice_list(output: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !ids.iter().any(|seen| seen == line) {
            ids.push(line.to_owned());
        }
    }
    ids
}

fn non_empty_or_unknown(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        UNKNOWN.to_owned()
    } else {
        value.to_owned()
    }
}
