//! BLE adapter recovery.
//!
//! BlueZ can leave a discovery session wedged after an interrupted scan, at
//! which point every subsequent `StartDiscovery` fails or hangs. After
//! [`FAILURE_THRESHOLD`] consecutive failures the controller first asks
//! `bluetoothctl` to stop discovery, and only if that fails resets the
//! adapter with `hciconfig`.

use crate::infrastructure::process::ProcessRunner;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_ADAPTER: &str = "hci0";

const SOFT_CLEAR_TIMEOUT: Duration = Duration::from_secs(5);
const HARD_RESET_TIMEOUT: Duration = Duration::from_secs(10);
const SOFT_CLEAR_SETTLE: Duration = Duration::from_secs(1);
const HARD_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Result of one [`RecoveryController::recover`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Failure count below threshold
    NotNeeded,
    /// Stale discovery session cleared
    SoftCleared,
    AdapterReset,
    /// Both stages failed; retried on the next attempt
    Failed,
}

pub struct RecoveryController {
    runner: Arc<dyn ProcessRunner>,
    adapter: Option<String>,
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl RecoveryController {
    pub fn new(runner: Arc<dyn ProcessRunner>, adapter: Option<String>) -> Self {
        Self {
            runner,
            adapter,
            consecutive_failures: AtomicU32::new(0),
            threshold: FAILURE_THRESHOLD,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn needs_recovery(&self) -> bool {
        self.consecutive_failures() >= self.threshold
    }

    /// Count a failed BLE scan. Returns the new consecutive count.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Attempt recovery if the failure count has reached the threshold.
    ///
    /// Never touches the failure count; only a successful scan clears it.
    pub async fn recover(&self) -> RecoveryOutcome {
        if !self.needs_recovery() {
            return RecoveryOutcome::NotNeeded;
        }

        warn!(
            "BLE scan failed {} times consecutively, attempting recovery",
            self.consecutive_failures()
        );

        if self.try_stop_discovery().await {
            tokio::time::sleep(SOFT_CLEAR_SETTLE).await;
            return RecoveryOutcome::SoftCleared;
        }

        if self.reset_adapter().await {
            tokio::time::sleep(HARD_RESET_SETTLE).await;
            return RecoveryOutcome::AdapterReset;
        }

        RecoveryOutcome::Failed
    }

    async fn try_stop_discovery(&self) -> bool {
        let args = ["scan".to_string(), "off".to_string()];
        match self.runner.run("bluetoothctl", &args, SOFT_CLEAR_TIMEOUT).await {
            Ok(output) if output.success => {
                info!("Cleared stuck BlueZ discovery via bluetoothctl");
                true
            }
            Ok(output) => {
                debug!("bluetoothctl scan off failed: {}", output.stderr.trim());
                false
            }
            Err(e) => {
                debug!("bluetoothctl scan off failed: {}", e);
                false
            }
        }
    }

    async fn reset_adapter(&self) -> bool {
        let adapter = self.adapter.as_deref().unwrap_or(DEFAULT_ADAPTER);
        let args = [adapter.to_string(), "reset".to_string()];
        match self.runner.run("hciconfig", &args, HARD_RESET_TIMEOUT).await {
            Ok(output) if output.success => {
                warn!("Reset Bluetooth adapter {}", adapter);
                true
            }
            Ok(output) => {
                error!("Adapter reset failed: {}", output.stderr.trim());
                false
            }
            Err(e) => {
                error!("Adapter reset error: {}", e);
                false
            }
        }
    }
}
