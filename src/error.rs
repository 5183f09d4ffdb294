//! Scan error taxonomy.
//!
//! Transport-level errors are always contained by the component that hit
//! them; they are classified here so each caller can pick the right log
//! severity and decide whether the failure drives adapter recovery.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// A deadline or subprocess timeout expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The adapter reports discovery already in progress.
    #[error("adapter busy: {0}")]
    ResourceBusy(String),

    /// A required external tool binary is missing.
    #[error("tool not available: {0}")]
    ToolUnavailable(String),

    /// The adapter rejected an operation it does not support.
    #[error("adapter does not support operation: {0}")]
    AdapterUnsupported(String),

    /// Vendor lookup network or parse error.
    #[error("vendor lookup failed: {0}")]
    LookupFailure(String),

    /// Any other error reported by the Bluetooth stack.
    #[error("bluetooth backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Classify a free-form backend message. BlueZ reports a wedged
    /// discovery session as `org.bluez.Error.InProgress`.
    pub fn from_backend_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("InProgress") || message.contains("already in progress") {
            Self::ResourceBusy(message)
        } else {
            Self::Backend(message)
        }
    }

    /// Errors that are expected on some hardware and only worth a debug line.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::ToolUnavailable(_) | Self::AdapterUnsupported(_))
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::LookupFailure(e.to_string())
    }
}

#[cfg(feature = "bluetooth")]
impl From<btleplug::Error> for ScanError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::TimedOut(d) => ScanError::Timeout(d),
            btleplug::Error::NotSupported(msg) => ScanError::AdapterUnsupported(msg),
            other => ScanError::from_backend_message(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
