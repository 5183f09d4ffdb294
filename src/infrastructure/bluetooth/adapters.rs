//! Local adapter inventory from `bluetoothctl list`.

use crate::domain::models::AdapterDescriptor;
use crate::error::ScanError;
use crate::infrastructure::process::ProcessRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const LIST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AdapterInventory {
    runner: Arc<dyn ProcessRunner>,
}

impl AdapterInventory {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Enumerate adapters. Failures are logged and yield an empty list.
    pub async fn list_adapters(&self) -> Vec<AdapterDescriptor> {
        match self.runner.run("bluetoothctl", &["list".to_string()], LIST_TIMEOUT).await {
            Ok(output) => parse_controller_list(&output.stdout),
            Err(ScanError::ToolUnavailable(_)) => {
                warn!("bluetoothctl not found - install bluez-utils");
                Vec::new()
            }
            Err(e) => {
                warn!("Could not list adapters: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parse `Controller <address> <alias...> [default]` lines. The N-th
/// controller is assumed to be `hciN`.
pub fn parse_controller_list(output: &str) -> Vec<AdapterDescriptor> {
    output
        .lines()
        .filter(|line| line.starts_with("Controller"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace().skip(1);
            let address = parts.next()?;
            let alias = parts.collect::<Vec<_>>().join(" ");
            (!alias.is_empty()).then(|| (address.to_string(), alias))
        })
        .enumerate()
        .map(|(idx, (address, alias))| AdapterDescriptor {
            id: format!("hci{idx}"),
            address,
            alias,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::process::fake::FakeRunner;
    use crate::infrastructure::process::ProcessOutput;

    const LIST: &str = "Controller 00:1A:7D:DA:71:13 raspberrypi [default]\n\
                        Controller 5C:F3:70:8B:12:34 USB Dongle\n\
                        Agent registered\n";

    #[test]
    fn test_parse_controller_list() {
        let adapters = parse_controller_list(LIST);
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].id, "hci0");
        assert_eq!(adapters[0].address, "00:1A:7D:DA:71:13");
        assert_eq!(adapters[0].alias, "raspberrypi [default]");
        assert_eq!(adapters[1].id, "hci1");
        assert_eq!(adapters[1].alias, "USB Dongle");
    }

    #[test]
    fn test_short_lines_skipped() {
        assert!(parse_controller_list("Controller 00:1A:7D:DA:71:13\n").is_empty());
        assert!(parse_controller_list("").is_empty());
    }

    #[tokio::test]
    async fn test_list_adapters() {
        let runner = Arc::new(FakeRunner::new().on("bluetoothctl list", || Ok(ProcessOutput::ok(LIST))));
        let inventory = AdapterInventory::new(runner);
        assert_eq!(inventory.list_adapters().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_tool_is_empty() {
        let inventory = AdapterInventory::new(Arc::new(FakeRunner::new()));
        assert!(inventory.list_adapters().await.is_empty());
    }
}
