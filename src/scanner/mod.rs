//! BLE scanner backends producing raw advertisement events.
//!
//! A backend owns the Bluetooth plumbing and pushes [`Advertisement`]s into a
//! channel; it performs no payload decoding. The subscription is cancellable:
//! when the adapter goes away or the monitor ends, the channel closes, which
//! the driver observes as "ingestion stopped".

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::advert::Advertisement;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Channel buffer size for advertisement events.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start scanning for beacon advertisements using the specified backend.
///
/// # Arguments
/// * `backend` - The scanner backend to use
/// * `verbose` - If true, per-device Bluetooth errors are logged instead of
///   silently dropped.
///
/// # Returns
/// A receiver for raw advertisement events. The channel closes when the
/// subscription terminates.
pub async fn start_scan(
    backend: Backend,
    verbose: bool,
) -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(verbose).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("bluez").unwrap(), Backend::Bluer);
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter missing".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter missing");
    }
}
