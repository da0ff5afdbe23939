//! Advertisement payload decoding for the supported vendor formats.
//!
//! All decoders are pure transforms from `(format tag, payload bytes)` to
//! typed field updates. Short, unknown or otherwise unrecognizable payloads
//! decode to `None`: over-the-air data is expected to be noisy, so a failed
//! decode is ordinary control flow, not an error.

use crate::device::{BeaconFrame, SensorKind};
use std::fmt::Write;

/// Apple company identifier carrying iBeacon frames.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Company identifier of the climate beacon vendor.
pub const CLIMATE_COMPANY_ID: u16 = 1593;

/// 128-bit service UUID under which climate and air-quality service data is
/// broadcast.
pub const SENSOR_SERVICE_UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

/// iBeacon frame marker: type 0x02, remaining length 0x15.
const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];
/// Climate vendor sub-type carrying temperature and humidity.
const CLIMATE_SUBTYPE: [u8; 2] = [0xCA, 0x05];
/// Climate vendor sub-type carrying the battery level.
const BATTERY_SUBTYPE: [u8; 2] = [0xCA, 0x00];
/// Service-data prefix for the battery/temperature/humidity frame.
const CLIMATE_SERVICE_PREFIX: [u8; 2] = [0xA1, 0x01];
/// Service-data prefix for the air-quality frame.
const AIR_QUALITY_SERVICE_PREFIX: [u8; 2] = [0xA7, 0x01];

/// Fields produced by a successful decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// An iBeacon-style proximity frame. The observed power is filled in by
    /// the caller from the advertisement that carried the frame.
    Beacon {
        uuid: String,
        major: u16,
        minor: u16,
        reference_power: i8,
    },
    /// Zero or more sensor readings.
    Readings(Vec<(SensorKind, f64)>),
}

/// Decode a manufacturer-data block.
///
/// Returns `None` for unknown company ids and for payloads that do not match
/// a known sub-format.
pub fn decode_manufacturer(company_id: u16, data: &[u8]) -> Option<Decoded> {
    match company_id {
        APPLE_COMPANY_ID => decode_ibeacon(data),
        CLIMATE_COMPANY_ID => decode_climate_vendor(data),
        _ => None,
    }
}

/// Decode a service-data block keyed by its service UUID.
pub fn decode_service(uuid: &str, data: &[u8]) -> Option<Decoded> {
    if uuid != SENSOR_SERVICE_UUID {
        return None;
    }
    if data.starts_with(&CLIMATE_SERVICE_PREFIX) {
        decode_climate_service(data)
    } else if data.starts_with(&AIR_QUALITY_SERVICE_PREFIX) {
        decode_air_quality(data)
    } else {
        None
    }
}

/// iBeacon layout after the 2-byte marker: 16-byte proximity UUID,
/// big-endian major and minor, one signed calibration byte.
fn decode_ibeacon(data: &[u8]) -> Option<Decoded> {
    if data.len() < 23 || !data.starts_with(&IBEACON_PREFIX) {
        return None;
    }
    Some(Decoded::Beacon {
        uuid: hex_string(&data[2..18]),
        major: be16(data, 18),
        minor: be16(data, 20),
        reference_power: data[22] as i8,
    })
}

fn decode_climate_vendor(data: &[u8]) -> Option<Decoded> {
    if data.len() < 9 {
        return None;
    }
    if data.starts_with(&CLIMATE_SUBTYPE) {
        // Two big-endian 16-bit fixed-point fields, 1/256 degree resolution.
        Some(Decoded::Readings(vec![
            (SensorKind::Temperature, f64::from(be16(data, 5)) / 256.0),
            (SensorKind::Humidity, f64::from(be16(data, 7)) / 256.0),
        ]))
    } else if data.starts_with(&BATTERY_SUBTYPE) {
        Some(Decoded::Readings(vec![(
            SensorKind::Battery,
            f64::from(data[8]),
        )]))
    } else {
        None
    }
}

fn decode_climate_service(data: &[u8]) -> Option<Decoded> {
    if data.len() < 7 {
        return None;
    }
    Some(Decoded::Readings(vec![
        (SensorKind::Battery, f64::from(data[2])),
        (SensorKind::Temperature, f64::from(be16(data, 3)) / 256.0),
        (SensorKind::Humidity, f64::from(be16(data, 5)) / 256.0),
    ]))
}

/// Air-quality frame: five big-endian 16-bit counts followed by temperature
/// and humidity encoded as a whole-unit byte plus a hundredths byte.
fn decode_air_quality(data: &[u8]) -> Option<Decoded> {
    let body = &data[2..];
    if body.len() < 14 {
        return None;
    }
    Some(Decoded::Readings(vec![
        (SensorKind::Co2, f64::from(be16(body, 0))),
        (SensorKind::Formaldehyde, f64::from(be16(body, 2))),
        (SensorKind::Tvoc, f64::from(be16(body, 4))),
        (SensorKind::Pm25, f64::from(be16(body, 6))),
        (SensorKind::Pm10, f64::from(be16(body, 8))),
        (
            SensorKind::Temperature,
            f64::from(body[10]) + f64::from(body[11]) / 100.0,
        ),
        (
            SensorKind::Humidity,
            f64::from(body[12]) + f64::from(body[13]) / 100.0,
        ),
    ]))
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
