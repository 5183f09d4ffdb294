//! Scan Orchestration Module
//!
//! Sequences the BLE and classic transports over the shared radio and
//! reconciles their results into one sighting list per cycle.

use crate::domain::models::ScannedDevice;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    classic::ClassicScanner,
    recovery::RecoveryController,
    scanner::{AdvertisementSource, BleScanner},
};
use crate::infrastructure::process::ProcessRunner;
use crate::infrastructure::vendor::VendorResolver;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs BLE then classic discovery, never both at once.
///
/// Running `hcitool inq` while BlueZ discovery is active locks the adapter
/// in inquiry mode and leaves the BLE D-Bus call hanging, so the classic
/// inquiry only starts once the BLE scan (including its deadline) is over.
pub struct ScanOrchestrator {
    ble: BleScanner,
    classic: Option<ClassicScanner>,
    scan_duration: Duration,
    inquiry_length: u8,
}

impl ScanOrchestrator {
    pub fn new(
        ble: BleScanner,
        classic: Option<ClassicScanner>,
        scan_duration: Duration,
        inquiry_length: u8,
    ) -> Self {
        Self {
            ble,
            classic,
            scan_duration,
            inquiry_length,
        }
    }

    /// Wire up both transports from settings.
    pub fn from_settings(
        settings: &Settings,
        source: Arc<dyn AdvertisementSource>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let adapter = settings.scan.adapter.clone();
        let vendors = Arc::new(VendorResolver::from_settings(
            &settings.vendor,
            settings.vendor_db_path(),
        ));

        let recovery = RecoveryController::new(Arc::clone(&runner), adapter.clone());
        let ble = BleScanner::new(source, recovery, Arc::clone(&vendors));
        let classic = settings
            .scan
            .classic_enabled
            .then(|| ClassicScanner::new(runner, adapter, vendors));

        Self::new(
            ble,
            classic,
            settings.scan.scan_duration(),
            settings.scan.inquiry_length,
        )
    }

    pub fn ble(&self) -> &BleScanner {
        &self.ble
    }

    pub fn scan_duration(&self) -> Duration {
        self.scan_duration
    }

    /// One full cycle: BLE, then classic, then merge. Never fails; a broken
    /// transport just contributes no devices.
    pub async fn scan(&self, duration: Duration) -> Vec<ScannedDevice> {
        let ble_devices = self.ble.scan(duration).await;

        let classic_devices = match &self.classic {
            Some(classic) => classic.scan(self.inquiry_length).await,
            None => Vec::new(),
        };

        let (ble_count, classic_count) = (ble_devices.len(), classic_devices.len());
        let devices = merge(ble_devices, classic_devices);
        info!(
            "Scan complete: {} BLE + {} classic = {} unique devices",
            ble_count,
            classic_count,
            devices.len()
        );
        devices
    }

    /// Scan every `interval` until `cancel` fires, handing each sighting to
    /// `callback` in merge order.
    ///
    /// Sightings are not deduplicated across cycles. A cycle interrupted by
    /// cancellation is dropped whole; its subprocesses and requests are
    /// aborted with it.
    pub async fn scan_continuous<F>(
        &self,
        mut callback: F,
        interval: Duration,
        cancel: &CancellationToken,
    ) where
        F: FnMut(ScannedDevice),
    {
        info!("Continuous scanning started (interval {:?})", interval);
        loop {
            let devices = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                devices = self.scan(self.scan_duration) => devices,
            };

            for device in devices {
                callback(device);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Continuous scanning stopped");
    }
}

/// Merge one cycle's results. BLE sightings win on address collision; order
/// is BLE in discovery order, then the remaining classic sightings. Classic
/// entries are only checked against BLE, never against each other.
pub fn merge(ble: Vec<ScannedDevice>, classic: Vec<ScannedDevice>) -> Vec<ScannedDevice> {
    let ble_keys: HashSet<String> = ble.iter().map(ScannedDevice::merge_key).collect();
    let mut devices = ble;

    for device in classic {
        if !ble_keys.contains(&device.merge_key()) {
            devices.push(device);
        } else {
            debug!("{} already seen over BLE, dropping classic sighting", device.address);
        }
    }
    devices
}
