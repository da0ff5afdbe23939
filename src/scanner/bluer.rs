//! BlueZ D-Bus backend for beacon scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::advert::Advertisement;
use crate::device_id::DeviceId;
use bluer::monitor::{Monitor, MonitorEvent};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for advertisements using the BlueZ D-Bus backend.
///
/// Initializes the Bluetooth adapter and registers an unfiltered
/// advertisement monitor; every sighting of a device is forwarded as a raw
/// [`Advertisement`]. Runs until the monitor ends, at which point the
/// returned channel closes.
pub async fn start_scan(verbose: bool) -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    let monitor_manager = adapter.monitor().await?;
    // No patterns: monitor every advertisement, the driver decides what it
    // can decode.
    let mut monitor_handle = monitor_manager.register(Monitor::default()).await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            if let MonitorEvent::DeviceFound(device_id) = event {
                match read_advertisement(&adapter, device_id.device).await {
                    Ok(advert) => {
                        if tx.send(advert).await.is_err() {
                            // Receiver gone, subscription cancelled.
                            break;
                        }
                    }
                    Err(e) if verbose => warn!("failed to read device properties: {}", e),
                    Err(e) => debug!("failed to read device properties: {}", e),
                }
            }
        }
    });

    Ok(rx)
}

/// Read the advertised properties of a discovered device into a raw event.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Advertisement, ScanError> {
    let device = adapter.device(address)?;

    let name = device.name().await?;
    let rssi = device.rssi().await?.unwrap_or(0);

    let service_uuids = device
        .uuids()
        .await?
        .map(|uuids| uuids.iter().map(|u| u.to_string()).collect())
        .unwrap_or_default();

    let service_data = device
        .service_data()
        .await?
        .map(|data| {
            data.into_iter()
                .map(|(uuid, bytes)| (uuid.to_string(), bytes))
                .collect()
        })
        .unwrap_or_default();

    let manufacturer_data = device.manufacturer_data().await?.unwrap_or_default();

    Ok(Advertisement {
        identity: DeviceId::from(address),
        name,
        rssi,
        service_uuids,
        service_data,
        manufacturer_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_to_device_id() {
        let addr = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let id: DeviceId = addr.into();
        assert_eq!(id, DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
    }

    #[test]
    fn test_device_id_display_is_normalized() {
        let id: DeviceId = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]).into();
        assert_eq!(format!("{}", id), "AABBCCDDEEFF");
    }
}
