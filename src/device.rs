//! Per-beacon device state: identity, smoothed signal, decoded sensor
//! readings and discovery metadata.
//!
//! A [`DeviceRecord`] is the unit of state owned by the registry. It is
//! mutated in place on every observed advertisement and projected into a
//! [`DeviceView`] for reporting, so later frames can only add to or overwrite
//! individual fields and never replace the record wholesale.

use crate::device_id::DeviceId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// EMA weight applied to the newest signal-strength sample.
const SIGNAL_ALPHA: f64 = 0.6;

/// Sensor channels a beacon can report.
///
/// Serialized names match the wire format of the published reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Battery,
    Temperature,
    Humidity,
    Co2,
    Formaldehyde,
    Tvoc,
    Pm25,
    Pm10,
}

/// Decoded iBeacon-style proximity frame.
///
/// All fields arrive together from a single frame; the record stores the
/// latest frame wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconFrame {
    /// Proximity UUID as 32 lowercase hex digits.
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    /// Calibrated signal strength at one meter, from the frame itself.
    #[serde(rename = "rssi_1m")]
    pub reference_power: i8,
    /// Signal strength of the advertisement that carried the frame.
    #[serde(rename = "rssi")]
    pub observed_power: i16,
}

/// State for one physical beacon, keyed by its normalized address.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub identity: DeviceId,
    pub display_name: Option<String>,
    /// Exponentially smoothed received-signal strength.
    pub signal_strength: Option<i16>,
    pub last_seen: SystemTime,
    /// Sparse; a key is present only once a frame has supplied it.
    pub sensor_readings: BTreeMap<SensorKind, f64>,
    pub beacon_frame: Option<BeaconFrame>,
    /// Service UUIDs observed in advertisements. Diagnostics only.
    pub seen_service_uuids: BTreeSet<String>,
    /// Service-data keys observed in advertisements. Diagnostics only.
    pub seen_service_data_keys: BTreeSet<String>,
    /// Manufacturer-data company ids observed, as decimal strings.
    pub seen_manufacturer_keys: BTreeSet<String>,
}

impl DeviceRecord {
    pub fn new(identity: DeviceId) -> Self {
        Self::new_at(identity, SystemTime::now())
    }

    pub fn new_at(identity: DeviceId, now: SystemTime) -> Self {
        Self {
            identity,
            display_name: None,
            signal_strength: None,
            last_seen: now,
            sensor_readings: BTreeMap::new(),
            beacon_frame: None,
            seen_service_uuids: BTreeSet::new(),
            seen_service_data_keys: BTreeSet::new(),
            seen_manufacturer_keys: BTreeSet::new(),
        }
    }

    /// Register that the beacon was heard: refresh name, smooth the signal
    /// sample into the stored value and bump `last_seen`.
    ///
    /// The first sample is stored as-is; later samples are blended as
    /// `round(0.6 * new + 0.4 * previous)`. The advertised name is always
    /// taken verbatim, including when it disappears; names are categorical,
    /// not smoothed.
    pub fn observe_presence(&mut self, name: Option<&str>, signal: i16) {
        self.observe_presence_at(name, signal, SystemTime::now());
    }

    pub fn observe_presence_at(&mut self, name: Option<&str>, signal: i16, now: SystemTime) {
        self.display_name = name.map(str::to_owned);
        self.signal_strength = Some(match self.signal_strength {
            Some(previous) => {
                let blended =
                    SIGNAL_ALPHA * f64::from(signal) + (1.0 - SIGNAL_ALPHA) * f64::from(previous);
                blended.round() as i16
            }
            None => signal,
        });
        self.last_seen = now;
    }

    /// Overwrite the stored value for `kind`. Last writer wins, both across
    /// frames within one advertisement and across advertisements.
    pub fn apply_sensor(&mut self, kind: SensorKind, value: f64) {
        self.sensor_readings.insert(kind, value);
    }

    /// Replace the beacon sub-structure wholesale.
    pub fn apply_beacon(&mut self, frame: BeaconFrame) {
        self.beacon_frame = Some(frame);
    }

    pub fn note_service_uuid(&mut self, uuid: &str) {
        if !self.seen_service_uuids.contains(uuid) {
            self.seen_service_uuids.insert(uuid.to_owned());
        }
    }

    pub fn note_service_data_key(&mut self, key: &str) {
        if !self.seen_service_data_keys.contains(key) {
            self.seen_service_data_keys.insert(key.to_owned());
        }
    }

    pub fn note_manufacturer_key(&mut self, company_id: u16) {
        self.seen_manufacturer_keys.insert(company_id.to_string());
    }

    /// Age of the record relative to `now`.
    ///
    /// A clock that moved backwards makes the record look brand new rather
    /// than failing; stale-record eviction tolerates that transient.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_seen).unwrap_or(Duration::ZERO)
    }

    /// Project every populated field for the per-device stream and the
    /// consolidated report.
    pub fn view_full(&self) -> DeviceView {
        DeviceView {
            address: self.identity.to_string(),
            name: self.display_name.clone(),
            rssi: self.signal_strength,
            last_seen: unix_seconds(self.last_seen),
            sensors: self.sensor_readings.clone(),
            ibeacon: self.beacon_frame.clone(),
        }
    }

    /// Project identity, name, signal and last-seen only.
    pub fn view_minimal(&self) -> DeviceView {
        DeviceView {
            address: self.identity.to_string(),
            name: self.display_name.clone(),
            rssi: self.signal_strength,
            last_seen: unix_seconds(self.last_seen),
            sensors: BTreeMap::new(),
            ibeacon: None,
        }
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Serializable projection of a [`DeviceRecord`] handed to delivery sinks.
///
/// Unpopulated fields are omitted from the JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    /// Unix timestamp in seconds.
    pub last_seen: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sensors: BTreeMap<SensorKind, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ibeacon: Option<BeaconFrame>,
}
