//! Bluetooth scan orchestration with adapter recovery and vendor lookup.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{AdapterDescriptor, ScannedDevice, Transport};
pub use error::{Result, ScanError};
pub use infrastructure::bluetooth::ScanOrchestrator;
