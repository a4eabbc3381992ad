//! Connected phones: records, discovery transport and the live registry.

pub mod registry;
pub mod transport;
pub mod types;

pub use registry::DeviceRegistry;
pub use transport::{CommandLineTransport, DeviceTransport};
pub use types::{ConnectionState, Device, DeviceInfo, Platform, ScanResult};
