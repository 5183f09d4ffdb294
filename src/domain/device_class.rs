//! Classic Bluetooth class-of-device decoding.
//!
//! ```text
//! 23            13 12      8 7        2 1 0
//! +---------------+---------+----------+---+
//! | service class |  major  |  minor   | 0 |
//! +---------------+---------+----------+---+
//! ```
//!
//! See the Bluetooth assigned numbers (baseband) for the full tables; only the
//! categories useful for presence classification are named here.

use serde::Serialize;

const MAJOR_PHONE: u32 = 0x02;
const MAJOR_AUDIO: u32 = 0x04;

/// Decoded major/minor class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceCategory {
    pub major: &'static str,
    pub minor: Option<&'static str>,
}

fn major_name(major: u32) -> &'static str {
    match major {
        0x01 => "computer",
        MAJOR_PHONE => "phone",
        0x03 => "network",
        MAJOR_AUDIO => "audio",
        0x05 => "peripheral",
        0x06 => "imaging",
        0x07 => "wearable",
        0x08 => "toy",
        0x09 => "health",
        _ => "unknown",
    }
}

fn audio_minor(minor: u32) -> Option<&'static str> {
    match minor {
        0x01 => Some("headset"),
        0x02 => Some("handsfree"),
        0x04 => Some("microphone"),
        0x05 => Some("speaker"),
        0x06 => Some("headphones"),
        0x07 => Some("portable_audio"),
        0x08 => Some("car_audio"),
        _ => None,
    }
}

fn phone_minor(minor: u32) -> Option<&'static str> {
    match minor {
        0x01 => Some("cellular"),
        0x02 => Some("cordless"),
        0x03 => Some("smartphone"),
        _ => None,
    }
}

pub fn parse_device_class(device_class: u32) -> DeviceCategory {
    let major = (device_class >> 8) & 0x1F;
    let minor = (device_class >> 2) & 0x3F;

    let minor = match major {
        MAJOR_AUDIO => audio_minor(minor),
        MAJOR_PHONE => phone_minor(minor),
        _ => None,
    };

    DeviceCategory {
        major: major_name(major),
        minor,
    }
}
