//! Ingestion driver: applies a stream of advertisement events to the
//! registry.
//!
//! For each event the driver resolves the record through the registry, locks
//! it for the duration of that event, and routes every payload block through
//! the pure decoders. Events for distinct identities only ever contend on a
//! brief shard-map access; events for the same identity serialize on the
//! record's own lock, so there are no lost updates and no torn reads of the
//! composite record.

use crate::advert::Advertisement;
use crate::decoder::{self, Decoded};
use crate::device::BeaconFrame;
use crate::registry::{DeviceRegistry, lock_record};
use log::trace;

/// Apply one advertisement event to the registry.
///
/// Malformed or unrecognized payload blocks decode to nothing; their format
/// tags are still recorded in the record's discovery sets. The record handle
/// is released when this function returns; it is never retained across
/// events.
pub fn process_event(registry: &DeviceRegistry, event: Advertisement) {
    let handle = registry.upsert(event.identity);
    let mut record = lock_record(&handle);

    record.observe_presence(event.name.as_deref(), event.rssi);

    for (company_id, data) in &event.manufacturer_data {
        record.note_manufacturer_key(*company_id);
        match decoder::decode_manufacturer(*company_id, data) {
            Some(Decoded::Beacon {
                uuid,
                major,
                minor,
                reference_power,
            }) => {
                record.apply_beacon(BeaconFrame {
                    uuid,
                    major,
                    minor,
                    reference_power,
                    observed_power: event.rssi,
                });
            }
            Some(Decoded::Readings(fields)) => {
                for (kind, value) in fields {
                    record.apply_sensor(kind, value);
                }
            }
            None => trace!(
                "no decoder matched manufacturer data {:#06x} from {}",
                company_id,
                event.identity
            ),
        }
    }

    for uuid in &event.service_uuids {
        record.note_service_uuid(uuid);
    }

    for (uuid, data) in &event.service_data {
        record.note_service_data_key(uuid);
        if let Some(Decoded::Readings(fields)) = decoder::decode_service(uuid, data) {
            for (kind, value) in fields {
                record.apply_sensor(kind, value);
            }
        }
    }
}
