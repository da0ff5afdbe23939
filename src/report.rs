//! Periodic reporting cycle: snapshot, publish, evict.
//!
//! The reporter owns the two time windows and the cumulative publish
//! counter. Transport is behind the [`ReportSink`] trait so the cycle can be
//! tested without a broker; the bundled [`JsonLineSink`] writes one JSON
//! document per line, which is also what the binary ships to stdout.

use crate::device::DeviceView;
use crate::registry::DeviceRegistry;
use log::info;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time windows governing one reporting cycle.
///
/// The snapshot window is wider than the eviction window: the report is
/// built before eviction runs, so a record between the two thresholds
/// appears in the cycle's report and is gone immediately after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindows {
    /// Records seen within this window are included in the report.
    pub snapshot: Duration,
    /// Records older than this are removed after the report is published.
    pub evict: Duration,
}

impl Default for ReportWindows {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(60),
            evict: Duration::from_secs(30),
        }
    }
}

/// Envelope metadata for a consolidated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMeta {
    /// Cumulative number of reports produced by this process.
    pub publish_count: u64,
    /// Unix timestamp in seconds at which the report was generated.
    pub generated_at: u64,
    /// Number of devices included in the report.
    pub device_count: usize,
}

/// A consolidated snapshot handed to the delivery sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub devices: Vec<DeviceView>,
}

/// Counts from one completed reporting cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Devices included in the published report.
    pub reported: usize,
    /// Devices evicted after the report was published.
    pub evicted: usize,
}

/// Destination for published reports.
///
/// Implementations own transport concerns (broker connections, retries);
/// the reporting cycle only produces the data.
pub trait ReportSink: Send {
    /// Deliver the consolidated snapshot.
    fn publish_report(&mut self, report: &Report) -> io::Result<()>;
    /// Deliver one device of the per-device stream.
    fn publish_device(&mut self, device: &DeviceView) -> io::Result<()>;
}

/// Sink that serializes every report and device as one JSON line.
pub struct JsonLineSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> ReportSink for JsonLineSink<W> {
    fn publish_report(&mut self, report: &Report) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, report)?;
        writeln!(self.out)
    }

    fn publish_device(&mut self, device: &DeviceView) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, device)?;
        writeln!(self.out)
    }
}

/// Drives the report-then-evict cycle against a registry.
pub struct Reporter {
    windows: ReportWindows,
    publish_count: AtomicU64,
}

impl Reporter {
    pub fn new(windows: ReportWindows) -> Self {
        Self {
            windows,
            publish_count: AtomicU64::new(0),
        }
    }

    /// Cumulative publish counter for inclusion in an outer envelope.
    pub fn metadata(&self) -> ReportMeta {
        ReportMeta {
            publish_count: self.publish_count.load(Ordering::Relaxed),
            generated_at: unix_now(),
            device_count: 0,
        }
    }

    /// Run one cycle: snapshot the registry, publish the consolidated report
    /// and the per-device stream, then evict stale records.
    ///
    /// Eviction runs strictly after the report is published, so a record
    /// older than the eviction window but inside the snapshot window still
    /// appears in this cycle's report.
    pub fn run_cycle(
        &self,
        registry: &DeviceRegistry,
        sink: &mut dyn ReportSink,
    ) -> io::Result<CycleOutcome> {
        self.run_cycle_at(registry, sink, SystemTime::now())
    }

    pub fn run_cycle_at(
        &self,
        registry: &DeviceRegistry,
        sink: &mut dyn ReportSink,
        now: SystemTime,
    ) -> io::Result<CycleOutcome> {
        let records = registry.snapshot_at(self.windows.snapshot, now);
        let devices: Vec<DeviceView> = records.iter().map(|r| r.view_full()).collect();

        let publish_count = self.publish_count.fetch_add(1, Ordering::Relaxed) + 1;
        let report = Report {
            meta: ReportMeta {
                publish_count,
                generated_at: unix_seconds(now),
                device_count: devices.len(),
            },
            devices,
        };

        sink.publish_report(&report)?;
        for device in &report.devices {
            sink.publish_device(device)?;
        }

        let evicted = registry.evict_older_than_at(self.windows.evict, now);
        info!(
            "published report #{} with {} devices, evicted {}",
            publish_count,
            report.devices.len(),
            evicted
        );

        Ok(CycleOutcome {
            reported: report.devices.len(),
            evicted,
        })
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn unix_now() -> u64 {
    unix_seconds(SystemTime::now())
}
