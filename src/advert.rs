//! Raw advertisement event delivered by a scanner backend.

use crate::device_id::DeviceId;
use std::collections::HashMap;

/// One received advertisement, before any payload decoding.
///
/// Scanner backends produce these; the ingestion driver consumes them. The
/// payload blocks are carried as raw bytes so decoding stays a pure,
/// backend-independent concern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Advertisement {
    pub identity: DeviceId,
    /// Advertised human-readable name, if any.
    pub name: Option<String>,
    /// Received signal strength of this advertisement in dBm.
    pub rssi: i16,
    /// Service UUIDs listed in the advertisement.
    pub service_uuids: Vec<String>,
    /// Service-data blocks keyed by service UUID.
    pub service_data: HashMap<String, Vec<u8>>,
    /// Manufacturer-data blocks keyed by company id.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl Advertisement {
    /// A bare presence advertisement with no payload blocks.
    pub fn presence(identity: DeviceId, name: Option<String>, rssi: i16) -> Self {
        Self {
            identity,
            name,
            rssi,
            ..Self::default()
        }
    }
}
