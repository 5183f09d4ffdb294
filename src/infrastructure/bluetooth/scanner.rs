//! BLE Scanner Module
//!
//! Runs one bounded advertisement-scanning cycle. The platform call is raced
//! against a hard deadline because BlueZ can block session setup on D-Bus
//! well past the requested scan window.

use crate::domain::models::{ScannedDevice, Transport};
use crate::error::{Result, ScanError};
use crate::infrastructure::bluetooth::recovery::{RecoveryController, RecoveryOutcome};
use crate::infrastructure::vendor::VendorResolver;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Grace on top of the scan window before a scan is declared hung.
pub const DEADLINE_GRACE: Duration = Duration::from_secs(10);

/// One advertiser seen during a scan window.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub address: String,
    /// Name the platform reports for the device
    pub device_name: Option<String>,
    /// Complete/short local name from the advertisement payload
    pub local_name: Option<String>,
    pub rssi: i16,
    pub service_uuids: Vec<String>,
}

/// Platform advertisement collection.
#[async_trait]
pub trait AdvertisementSource: Send + Sync {
    /// Collect advertisements for `window`, in first-seen order.
    async fn discover(&self, window: Duration) -> Result<Vec<Advertisement>>;
}

/// BLE scanner for nearby devices
pub struct BleScanner {
    source: Arc<dyn AdvertisementSource>,
    recovery: RecoveryController,
    vendors: Arc<VendorResolver>,
}

impl BleScanner {
    pub fn new(
        source: Arc<dyn AdvertisementSource>,
        recovery: RecoveryController,
        vendors: Arc<VendorResolver>,
    ) -> Self {
        Self {
            source,
            recovery,
            vendors,
        }
    }

    pub fn recovery(&self) -> &RecoveryController {
        &self.recovery
    }

    /// Run one scan cycle. Failures are logged and counted, never returned.
    pub async fn scan(&self, duration: Duration) -> Vec<ScannedDevice> {
        if self.recovery.needs_recovery() {
            let outcome = self.recovery.recover().await;
            if outcome == RecoveryOutcome::Failed {
                warn!("BLE recovery failed, scanning anyway");
            }
        }

        let deadline = duration + DEADLINE_GRACE;
        let result = match tokio::time::timeout(deadline, self.source.discover(duration)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout(deadline)),
        };

        match result {
            Ok(advertisements) => {
                let mut devices = Vec::with_capacity(advertisements.len());
                for adv in advertisements {
                    let vendor = self.vendors.resolve(&adv.address).await;
                    devices.push(ScannedDevice {
                        name: adv.device_name.or(adv.local_name),
                        address: adv.address,
                        signal_strength: adv.rssi,
                        vendor,
                        service_uuids: adv.service_uuids,
                        transport: Transport::Ble,
                        device_class: None,
                    });
                }
                debug!("BLE scan: found {} devices", devices.len());
                self.recovery.record_success();
                devices
            }
            Err(e) => {
                self.log_failure(&e);
                Vec::new()
            }
        }
    }

    fn log_failure(&self, e: &ScanError) {
        let failures = self.recovery.record_failure();
        let threshold = self.recovery.threshold();
        match e {
            ScanError::Timeout(_) => warn!(
                "BLE scan timed out (adapter may be busy, failure {}/{})",
                failures, threshold
            ),
            ScanError::ResourceBusy(msg) => {
                error!("BLE scan error: {} (failure {}/{})", msg, failures, threshold)
            }
            e if e.is_expected() => debug!("BLE scan unavailable: {}", e),
            e => error!("BLE scan error: {}", e),
        }
    }
}

#[cfg(feature = "bluetooth")]
pub use platform::BtleplugSource;

#[cfg(feature = "bluetooth")]
mod platform {
    use super::{Advertisement, AdvertisementSource};
    use crate::error::{Result, ScanError};
    use async_trait::async_trait;
    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use std::time::Duration;
    use tokio::sync::OnceCell;
    use tracing::{debug, trace};

    /// [`AdvertisementSource`] backed by btleplug (BlueZ, CoreBluetooth, WinRT).
    ///
    /// The manager (one D-Bus session on BlueZ) is opened on the first scan
    /// and reused for every later one.
    pub struct BtleplugSource {
        adapter: Option<String>,
        manager: OnceCell<Manager>,
    }

    impl BtleplugSource {
        pub fn new(adapter: Option<String>) -> Self {
            Self {
                adapter,
                manager: OnceCell::new(),
            }
        }

        async fn manager(&self) -> Result<&Manager> {
            self.manager
                .get_or_try_init(|| async { Manager::new().await.map_err(ScanError::from) })
                .await
        }

        async fn central(&self) -> Result<Adapter> {
            let adapters = self.manager().await?.adapters().await?;

            let Some(wanted) = self.adapter.as_deref() else {
                return adapters
                    .into_iter()
                    .next()
                    .ok_or_else(|| ScanError::AdapterUnsupported("no Bluetooth adapter found".into()));
            };

            for adapter in adapters {
                // BlueZ reports e.g. "hci0 (usb:v1D6Bp0246d0540)"
                let info = adapter.adapter_info().await?;
                if info.split_whitespace().next() == Some(wanted) {
                    return Ok(adapter);
                }
            }
            Err(ScanError::AdapterUnsupported(format!("adapter {wanted} not found")))
        }

        fn address_of(peripheral: &Peripheral) -> String {
            // CoreBluetooth never exposes the hardware address.
            #[cfg(target_os = "macos")]
            {
                peripheral.id().to_string().to_uppercase()
            }
            #[cfg(not(target_os = "macos"))]
            {
                peripheral.address().to_string().to_uppercase()
            }
        }
    }

    #[async_trait]
    impl AdvertisementSource for BtleplugSource {
        async fn discover(&self, window: Duration) -> Result<Vec<Advertisement>> {
            let central = self.central().await?;
            central.start_scan(ScanFilter::default()).await?;
            tokio::time::sleep(window).await;
            let peripherals = central.peripherals().await;
            if let Err(e) = central.stop_scan().await {
                debug!("stop_scan failed: {}", e);
            }

            let mut seen = Vec::new();
            for peripheral in peripherals? {
                let Some(props) = peripheral.properties().await? else {
                    continue;
                };
                // Cached by the stack but silent during this window
                let Some(rssi) = props.rssi else {
                    trace!("Skipping {} (no RSSI)", props.address);
                    continue;
                };
                seen.push(Advertisement {
                    address: Self::address_of(&peripheral),
                    device_name: None,
                    local_name: props.local_name,
                    rssi,
                    service_uuids: props.services.iter().map(|u| u.to_string()).collect(),
                });
            }
            Ok(seen)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_manager_opened_lazily() {
            let source = BtleplugSource::new(Some("hci0".into()));
            assert!(!source.manager.initialized());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::process::fake::FakeRunner;
    use crate::infrastructure::process::ProcessOutput;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) enum Script {
        Found(Vec<Advertisement>),
        Fail(fn() -> ScanError),
        Hang,
    }

    /// Replays scripted scan outcomes, then reports nothing found.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Script>>,
        pub(crate) calls: Mutex<u32>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl AdvertisementSource for ScriptedSource {
        async fn discover(&self, window: Duration) -> Result<Vec<Advertisement>> {
            *self.calls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Found(ads)) => {
                    tokio::time::sleep(window).await;
                    Ok(ads)
                }
                Some(Script::Fail(make)) => Err(make()),
                Some(Script::Hang) => std::future::pending().await,
                None => Ok(Vec::new()),
            }
        }
    }

    pub(crate) fn adv(address: &str, name: Option<&str>, rssi: i16) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            local_name: name.map(String::from),
            rssi,
            ..Default::default()
        }
    }

    fn offline_resolver() -> Arc<VendorResolver> {
        Arc::new(VendorResolver::new("http://127.0.0.1:9/").without_online_lookup())
    }

    fn scanner(source: Arc<ScriptedSource>, runner: Arc<FakeRunner>) -> BleScanner {
        BleScanner::new(source, RecoveryController::new(runner, None), offline_resolver())
    }

    fn busy() -> ScanError {
        ScanError::from_backend_message("org.bluez.Error.InProgress")
    }

    #[tokio::test(start_paused = true)]
    async fn test_parses_advertisements() {
        let mut with_services = adv("AC:DE:48:00:11:22", Some("Beacon"), -58);
        with_services.device_name = Some("Kitchen Sensor".into());
        with_services.service_uuids = vec!["0000180f-0000-1000-8000-00805f9b34fb".into()];
        let source = Arc::new(ScriptedSource::new(vec![Script::Found(vec![
            with_services,
            adv("7A:11:22:33:44:55", Some("Phone"), -80),
            adv("00:1A:7D:DA:71:13", None, -91),
        ])]));
        let ble = scanner(source, Arc::new(FakeRunner::new()));

        let devices = ble.scan(Duration::from_secs(5)).await;
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].name.as_deref(), Some("Kitchen Sensor"));
        assert_eq!(devices[0].service_uuids.len(), 1);
        assert_eq!(devices[1].name.as_deref(), Some("Phone"));
        assert_eq!(devices[1].vendor, None);
        assert_eq!(devices[2].name, None);
        assert_eq!(devices[2].signal_strength, -91);
        assert!(devices.iter().all(|d| d.transport == Transport::Ble));
        assert!(devices.iter().all(|d| d.device_class.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counts_and_success_resets() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Fail(busy),
            Script::Fail(|| ScanError::Backend("org.bluez.Error.NotReady".into())),
            Script::Found(Vec::new()),
        ]));
        let ble = scanner(source, Arc::new(FakeRunner::new()));

        assert!(ble.scan(Duration::from_secs(1)).await.is_empty());
        assert_eq!(ble.recovery().consecutive_failures(), 1);
        assert!(ble.scan(Duration::from_secs(1)).await.is_empty());
        assert_eq!(ble.recovery().consecutive_failures(), 2);
        // Zero devices is still a success
        assert!(ble.scan(Duration::from_secs(1)).await.is_empty());
        assert_eq!(ble.recovery().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_scan_hits_deadline() {
        let source = Arc::new(ScriptedSource::new(vec![Script::Hang]));
        let ble = scanner(source, Arc::new(FakeRunner::new()));

        let start = tokio::time::Instant::now();
        let devices = ble.scan(Duration::from_secs(5)).await;
        assert!(devices.is_empty());
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(ble.recovery().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_failure_triggers_soft_clear_only() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Fail(busy),
            Script::Fail(busy),
            Script::Fail(busy),
            Script::Found(vec![adv("00:1A:7D:DA:71:13", None, -70)]),
        ]));
        let runner = Arc::new(
            FakeRunner::new()
                .on("bluetoothctl scan off", || Ok(ProcessOutput::ok("Discovery stopped")))
                .on("hciconfig", || Ok(ProcessOutput::ok(""))),
        );
        let ble = scanner(Arc::clone(&source), Arc::clone(&runner));

        for _ in 0..3 {
            ble.scan(Duration::from_secs(1)).await;
        }
        assert!(runner.calls().is_empty());
        assert_eq!(ble.recovery().consecutive_failures(), 3);

        let devices = ble.scan(Duration::from_secs(1)).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(runner.count("bluetoothctl scan off"), 1);
        assert_eq!(runner.count("hciconfig"), 0);
        assert_eq!(ble.recovery().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recovery_still_scans() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Hang,
            Script::Hang,
            Script::Hang,
            Script::Fail(busy),
        ]));
        let runner = Arc::new(FakeRunner::new());
        let ble = scanner(Arc::clone(&source), Arc::clone(&runner));

        for _ in 0..4 {
            ble.scan(Duration::from_secs(1)).await;
        }
        assert_eq!(*source.calls.lock().unwrap(), 4);
        // Both stages attempted on the 4th call, neither tool available
        assert_eq!(runner.calls(), vec!["bluetoothctl scan off", "hciconfig hci0 reset"]);
        assert_eq!(ble.recovery().consecutive_failures(), 4);
    }
}
