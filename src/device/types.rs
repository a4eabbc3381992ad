//! Device records and platform tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mobile platform a device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Render the platform to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    /// Parse a platform tag, accepting common spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "android" => Some(Self::Android),
            "ios" | "iphone" => Some(Self::Ios),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the registry currently holds a live session to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Display metadata reported by the transport on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
    pub os_version: String,
}

impl DeviceInfo {
    /// Metadata used when the transport cannot report anything.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            brand: UNKNOWN.to_owned(),
            model: UNKNOWN.to_owned(),
            os_version: UNKNOWN.to_owned(),
        }
    }
}

/// Placeholder for metadata fields the device did not report.
pub const UNKNOWN: &str = "Unknown";

/// A registered automation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub platform: Platform,
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub connection_state: ConnectionState,
    /// Last successful connect.
    pub connected_at: DateTime<Utc>,
}

impl Device {
    /// Build a connected device record from transport metadata.
    #[must_use]
    pub fn connected(device_id: impl Into<String>, platform: Platform, info: DeviceInfo) -> Self {
        Self {
            device_id: device_id.into(),
            platform,
            brand: info.brand,
            model: info.model,
            os_version: info.os_version,
            connection_state: ConnectionState::Connected,
            connected_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

/// Candidate identifiers found by a scan, per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub android: Vec<String>,
    pub ios: Vec<String>,
}
