use serde::{Deserialize, Serialize};

use crate::domain::device_class::{self, DeviceCategory};

/// Fixed signal placeholder for classic inquiry results. `hcitool inq`
/// exposes no RSSI.
pub const CLASSIC_RSSI_PLACEHOLDER: i16 = -60;

/// Which Bluetooth transport produced a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Ble,
    Classic,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Ble => write!(f, "ble"),
            Transport::Classic => write!(f, "classic"),
        }
    }
}

/// A device observed during one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedDevice {
    pub address: String,
    pub name: Option<String>,
    /// dBm
    pub signal_strength: i16,
    pub vendor: Option<String>,
    /// Advertised service UUIDs (BLE only)
    #[serde(default)]
    pub service_uuids: Vec<String>,
    pub transport: Transport,
    /// 24-bit class of device (classic only)
    pub device_class: Option<u32>,
}

impl ScannedDevice {
    /// Key used to reconcile sightings of the same radio across transports.
    pub fn merge_key(&self) -> String {
        normalize_address(&self.address)
    }

    /// Decoded class of device, if the transport reported one.
    pub fn category(&self) -> Option<DeviceCategory> {
        self.device_class.map(device_class::parse_device_class)
    }
}

/// A local Bluetooth radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    /// Platform adapter name, e.g. `hci0`
    pub id: String,
    pub address: String,
    pub alias: String,
}

pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase()
}

/// macOS hides real addresses behind CoreBluetooth peripheral UUIDs
/// (`8-4-4-4-12` hex groups). Those carry no OUI.
pub fn is_uuid_address(address: &str) -> bool {
    let groups: Vec<&str> = address.split('-').collect();
    let expected = [8, 4, 4, 4, 12];
    groups.len() == expected.len()
        && groups
            .iter()
            .zip(expected)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse a colon-hex hardware address into its six octets.
pub fn parse_mac(address: &str) -> Option<[u8; 6]> {
    let mut octets = [0u8; 6];
    let mut parts = address.trim().split(':');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *octet = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

/// Locally administered (privacy-randomized) address: bit 1 of the first
/// octet is set. Only colon-hex addresses qualify, so UUID-form identifiers
/// and fragments are never randomized.
pub fn is_randomized(address: &str) -> bool {
    parse_mac(address).is_some_and(|octets| octets[0] & 0x02 != 0)
}

/// First three octets, uppercase, as sent to the vendor service (`AA:BB:CC`).
pub fn oui(address: &str) -> Option<String> {
    parse_mac(address)?;
    Some(normalize_address(&address.trim()[..8]))
}
