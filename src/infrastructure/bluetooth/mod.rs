//! Bluetooth Module
//!
//! Discovers nearby BLE and classic Bluetooth devices and keeps the
//! adapter usable across repeated scans.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ScanOrchestrator                      │
//! │  (BLE then classic, merged per cycle, BLE wins)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌────────────┐  ┌────────────┐  ┌──────────────┐
//! │ BleScanner │  │  Classic   │  │  Adapter     │
//! │            │  │  Scanner   │  │  Inventory   │
//! │ - deadline │  │ - hcitool  │  │ - bluetoothctl│
//! │ - recovery │  │   inq/name │  │   list       │
//! └────────────┘  └────────────┘  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scanner`] - BLE advertisement scanning with a hard deadline
//! - [`recovery`] - Failure counting and adapter recovery
//! - [`classic`] - Classic inquiry and name lookup
//! - [`adapters`] - Local adapter enumeration
//! - [`service`] - Scan orchestration

pub mod adapters;
pub mod classic;
pub mod recovery;
pub mod scanner;
pub mod service;

pub use adapters::AdapterInventory;
pub use classic::ClassicScanner;
pub use recovery::{RecoveryController, RecoveryOutcome};
pub use scanner::{Advertisement, AdvertisementSource, BleScanner};
pub use service::ScanOrchestrator;

#[cfg(feature = "bluetooth")]
pub use scanner::BtleplugSource;
