//! Classic Bluetooth inquiry via `hcitool`.
//!
//! `hcitool inq` prints one line per responding device:
//!
//! ```text
//! Inquiring ...
//! 	00:1A:7D:DA:71:13	clock offset: 0x4c1b	class: 0x5a020c
//! ```
//!
//! Names need a second `hcitool name` round trip per device.

use crate::domain::models::{ScannedDevice, Transport, CLASSIC_RSSI_PLACEHOLDER};
use crate::error::ScanError;
use crate::infrastructure::process::ProcessRunner;
use crate::infrastructure::vendor::VendorResolver;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default inquiry length, in 1.28 s units (~10 s).
pub const DEFAULT_INQUIRY_LENGTH: u8 = 8;
const INQUIRY_UNIT_SECS: f64 = 1.28;
const INQUIRY_GRACE: Duration = Duration::from_secs(5);
const NAME_TIMEOUT: Duration = Duration::from_secs(5);

static INQUIRY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f:]{17})\s+clock offset:.*class:\s*0x([0-9A-Fa-f]+)")
        .expect("inquiry line pattern is valid")
});

/// One device reported by `hcitool inq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryResult {
    pub address: String,
    pub device_class: u32,
}

/// Parse `hcitool inq` output, skipping anything that is not a result line.
pub fn parse_inquiry_output(output: &str) -> Vec<InquiryResult> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("Inquiring"))
        .filter_map(|line| {
            let caps = INQUIRY_LINE.captures(line)?;
            let device_class = u32::from_str_radix(&caps[2], 16).ok()?;
            Some(InquiryResult {
                address: caps[1].to_uppercase(),
                device_class,
            })
        })
        .collect()
}

/// Overall timeout for an inquiry of `length` units.
pub fn inquiry_timeout(length: u8) -> Duration {
    Duration::from_secs_f64(f64::from(length) * INQUIRY_UNIT_SECS) + INQUIRY_GRACE
}

pub struct ClassicScanner {
    runner: Arc<dyn ProcessRunner>,
    adapter: Option<String>,
    vendors: Arc<VendorResolver>,
}

impl ClassicScanner {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        adapter: Option<String>,
        vendors: Arc<VendorResolver>,
    ) -> Self {
        Self {
            runner,
            adapter,
            vendors,
        }
    }

    fn adapter_args(&self) -> Vec<String> {
        match &self.adapter {
            Some(adapter) => vec!["-i".to_string(), adapter.clone()],
            None => Vec::new(),
        }
    }

    /// Run one inquiry of `length` units. Any failure yields no devices.
    pub async fn scan(&self, length: u8) -> Vec<ScannedDevice> {
        let mut args = self.adapter_args();
        args.extend(["inq".to_string(), "--length".to_string(), length.to_string()]);

        let output = match self.runner.run("hcitool", &args, inquiry_timeout(length)).await {
            Ok(output) => output,
            Err(ScanError::Timeout(_)) => {
                debug!("Classic scan timed out");
                return Vec::new();
            }
            Err(ScanError::ToolUnavailable(_)) => {
                debug!("hcitool not found - classic Bluetooth scanning unavailable");
                return Vec::new();
            }
            Err(e) => {
                debug!("Classic scan error: {}", e);
                return Vec::new();
            }
        };

        if !output.success {
            let message = output.stderr.trim();
            let message = if message.is_empty() { "Unknown error" } else { message };
            // Adapters without inquiry support report "Device not configured"
            if message.to_lowercase().contains("not configured") {
                trace!("Classic inquiry unsupported: {}", message);
            } else {
                warn!("Classic scan failed: {}", message);
            }
            return Vec::new();
        }

        let mut devices = Vec::new();
        for result in parse_inquiry_output(&output.stdout) {
            let name = self.device_name(&result.address).await;
            let vendor = self.vendors.resolve(&result.address).await;
            devices.push(ScannedDevice {
                address: result.address,
                name,
                signal_strength: CLASSIC_RSSI_PLACEHOLDER,
                vendor,
                service_uuids: Vec::new(),
                transport: Transport::Classic,
                device_class: Some(result.device_class),
            });
        }

        debug!("Classic scan: found {} devices", devices.len());
        devices
    }

    async fn device_name(&self, address: &str) -> Option<String> {
        let mut args = self.adapter_args();
        args.extend(["name".to_string(), address.to_string()]);

        match self.runner.run("hcitool", &args, NAME_TIMEOUT).await {
            Ok(output) => {
                let name = output.stdout.trim();
                (!name.is_empty()).then(|| name.to_string())
            }
            Err(e) => {
                trace!("Name lookup for {} failed: {}", address, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::process::fake::FakeRunner;
    use crate::infrastructure::process::ProcessOutput;

    const INQUIRY: &str = "Inquiring ...\n\
        \t00:1a:7d:da:71:13\tclock offset: 0x4c1b\tclass: 0x5a020c\n\
        \n\
        \tF0:18:98:AA:BB:CC\tclock offset: 0x1f3a\tclass: 0x240414\n\
        garbage line\n\
        \t11:22:33:44:55\tclock offset: 0x0000\tclass: 0x000000\n";

    fn vendors() -> Arc<VendorResolver> {
        Arc::new(VendorResolver::new("http://127.0.0.1:9/").without_online_lookup())
    }

    fn scanner(runner: Arc<FakeRunner>, adapter: Option<&str>) -> ClassicScanner {
        ClassicScanner::new(runner, adapter.map(String::from), vendors())
    }

    #[test]
    fn test_parse_inquiry_output() {
        let results = parse_inquiry_output(INQUIRY);
        assert_eq!(
            results,
            vec![
                InquiryResult {
                    address: "00:1A:7D:DA:71:13".into(),
                    device_class: 0x5a020c
                },
                InquiryResult {
                    address: "F0:18:98:AA:BB:CC".into(),
                    device_class: 0x240414
                },
            ]
        );
    }

    #[test]
    fn test_inquiry_timeout() {
        assert_eq!(inquiry_timeout(8), Duration::from_secs_f64(8.0 * 1.28 + 5.0));
        assert_eq!(inquiry_timeout(0), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_scan_resolves_names() {
        let runner = Arc::new(
            FakeRunner::new()
                .on("hcitool -i hci1 inq --length 8", || Ok(ProcessOutput::ok(INQUIRY)))
                .on("hcitool -i hci1 name 00:1A:7D:DA:71:13", || Ok(ProcessOutput::ok("Pixel 7\n")))
                .on("hcitool -i hci1 name F0:18:98:AA:BB:CC", || Ok(ProcessOutput::ok("\n"))),
        );
        let classic = scanner(Arc::clone(&runner), Some("hci1"));

        let devices = classic.scan(DEFAULT_INQUIRY_LENGTH).await;
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].address, "00:1A:7D:DA:71:13");
        assert_eq!(devices[0].name.as_deref(), Some("Pixel 7"));
        assert_eq!(devices[0].signal_strength, CLASSIC_RSSI_PLACEHOLDER);
        assert_eq!(devices[0].transport, Transport::Classic);
        assert_eq!(devices[0].category().map(|c| c.minor), Some(Some("smartphone")));

        assert_eq!(devices[1].name, None);
        assert_eq!(devices[1].device_class, Some(0x240414));
        assert!(devices[1].service_uuids.is_empty());

        // One inquiry plus one name lookup per device, in order
        assert_eq!(runner.count("hcitool -i hci1 inq"), 1);
        assert_eq!(runner.count("hcitool -i hci1 name"), 2);
    }

    #[tokio::test]
    async fn test_no_adapter_flag_without_adapter() {
        let runner = Arc::new(FakeRunner::new().on("hcitool inq --length 3", || Ok(ProcessOutput::ok(""))));
        let classic = scanner(Arc::clone(&runner), None);

        assert!(classic.scan(3).await.is_empty());
        assert_eq!(runner.calls(), vec!["hcitool inq --length 3"]);
    }

    #[tokio::test]
    async fn test_unsupported_adapter_yields_nothing() {
        let runner = Arc::new(FakeRunner::new().on("hcitool", || {
            Ok(ProcessOutput::failed("Inquiry failed: Device not configured"))
        }));
        assert!(scanner(runner, None).scan(8).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_and_timeout_yield_nothing() {
        let runner = Arc::new(FakeRunner::new());
        assert!(scanner(runner, None).scan(8).await.is_empty());

        let runner = Arc::new(
            FakeRunner::new().on("hcitool", || Err(ScanError::Timeout(inquiry_timeout(8)))),
        );
        assert!(scanner(runner, None).scan(8).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_name_lookup_keeps_device() {
        let runner = Arc::new(
            FakeRunner::new()
                .on("hcitool inq", || {
                    Ok(ProcessOutput::ok("\t00:1A:7D:DA:71:13\tclock offset: 0x4c1b\tclass: 0x200404\n"))
                })
                .on("hcitool name", || Err(ScanError::Timeout(NAME_TIMEOUT))),
        );
        let devices = scanner(runner, None).scan(8).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, None);
        assert_eq!(devices[0].category().map(|c| c.major), Some("audio"));
    }
}
