use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the configured adapter (e.g. `hci1`).
pub const ADAPTER_ENV: &str = "BTSCAN_ADAPTER";
/// Overrides the data directory (vendor database cache).
pub const DATA_DIR_ENV: &str = "BTSCAN_DATA_DIR";

/// Tracing output. `btscan -v` raises `level` to `debug`; `RUST_LOG` wins
/// over both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    /// Rolling file output under `log_dir`
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    /// Console logs go to stderr so scan output on stdout stays parseable
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Rolled files are named `<prefix>.<date>`
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Adapter to scan with (`hciN`); `None` lets the platform choose.
    #[serde(default)]
    pub adapter: Option<String>,
    /// BLE advertisement window per cycle
    #[serde(default = "default_scan_duration")]
    pub scan_duration_secs: u64,
    /// Pause between cycles in continuous mode
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_true")]
    pub classic_enabled: bool,
    /// Classic inquiry length in 1.28 s units
    #[serde(default = "default_inquiry_length")]
    pub inquiry_length: u8,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            adapter: None,
            scan_duration_secs: default_scan_duration(),
            scan_interval_secs: default_scan_interval(),
            classic_enabled: default_true(),
            inquiry_length: default_inquiry_length(),
        }
    }
}

impl ScanSettings {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSettings {
    #[serde(default = "default_true")]
    pub online_lookup: bool,
    /// OUI is appended directly, so keep the trailing slash.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_true")]
    pub offline_db: bool,
    #[serde(default = "default_oui_source_url")]
    pub oui_source_url: String,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            online_lookup: default_true(),
            api_url: default_api_url(),
            offline_db: default_true(),
            oui_source_url: default_oui_source_url(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "btscan".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_scan_duration() -> u64 {
    5
}
fn default_scan_interval() -> u64 {
    10
}
fn default_inquiry_length() -> u8 {
    8
}
fn default_api_url() -> String {
    "https://api.macvendors.com/".to_string()
}
fn default_oui_source_url() -> String {
    "https://standards-oui.ieee.org/oui/oui.txt".to_string()
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("btscan")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub vendor: VendorSettings,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            scan: ScanSettings::default(),
            vendor: VendorSettings::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Settings {
    /// Apply `BTSCAN_*` overrides from the given lookup (normally the process
    /// environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(adapter) = lookup(ADAPTER_ENV).filter(|a| !a.trim().is_empty()) {
            self.scan.adapter = Some(adapter.trim().to_string());
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Location of the persisted offline vendor table.
    pub fn vendor_db_path(&self) -> PathBuf {
        self.data_dir.join("mac-vendors.txt")
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from an explicit path. A missing or corrupt file yields defaults.
    pub fn load(settings_path: PathBuf) -> Self {
        let mut settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("btscan");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
