use crate::advert::Advertisement;
use crate::device::DeviceView;
use crate::device_id::DeviceId;
use crate::report::{Report, ReportSink};
use std::io;

/// A stable device identity for unit tests.
pub const TEST_ID: DeviceId = DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Build a bare advertisement with no payload blocks.
///
/// Tests add just the payload blocks they care about.
pub fn advertisement(identity: DeviceId, name: Option<&str>, rssi: i16) -> Advertisement {
    Advertisement::presence(identity, name.map(str::to_owned), rssi)
}

/// Report sink that records everything it is handed.
#[derive(Default)]
pub struct MemorySink {
    pub reports: Vec<Report>,
    pub devices: Vec<DeviceView>,
}

impl ReportSink for MemorySink {
    fn publish_report(&mut self, report: &Report) -> io::Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }

    fn publish_device(&mut self, device: &DeviceView) -> io::Result<()> {
        self.devices.push(device.clone());
        Ok(())
    }
}
