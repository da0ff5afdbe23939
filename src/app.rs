//! Core application runner (business logic) for `beacon-gateway`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically with an injected scanner and
//! an injected report sink.

use crate::advert::Advertisement;
use crate::ingest;
use crate::registry::DeviceRegistry;
use crate::report::{ReportSink, ReportWindows, Reporter};
use crate::scanner::{Backend, ScanError};
use clap::Parser;
use log::info;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Period between consolidated reports.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub report_interval: Duration,

    /// Devices seen within this window are included in each report.
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub snapshot_window: Duration,

    /// Devices unseen for longer than this are removed after each report.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub evict_window: Duration,

    /// Verbose output, log per-device scan errors
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    /// The reporting windows derived from these options.
    pub fn windows(&self) -> ReportWindows {
        ReportWindows {
            snapshot: self.snapshot_window,
            evict: self.evict_window,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth
/// hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(backend, verbose).await })
    }
}

/// Run the core processing loop until the advertisement subscription ends.
///
/// Inbound events are applied to `registry` as they arrive; on every
/// `report_interval` tick the reporter publishes a snapshot to `sink` and
/// then evicts stale records. When the event source closes, the loop exits
/// cleanly and the registry stays valid and queryable by the caller.
pub async fn run(
    options: Options,
    scanner: &dyn Scanner,
    registry: &DeviceRegistry,
    reporter: &Reporter,
    sink: &mut dyn ReportSink,
) -> Result<(), RunError> {
    let mut events = scanner.start_scan(options.backend, options.verbose).await?;

    let mut ticker = tokio::time::interval(options.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first report
    // happens one full interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => ingest::process_event(registry, event),
                None => break,
            },
            _ = ticker.tick() => {
                reporter.run_cycle(registry, sink)?;
            }
        }
    }

    info!(
        "ingestion stopped, {} devices still registered",
        registry.len()
    );
    Ok(())
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return Ok(Duration::from_secs(minutes * 60));
    }

    if let Some(num) = src.strip_suffix('s') {
        let secs: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds: {}", num))?;
        return Ok(Duration::from_secs(secs));
    }

    // No suffix, treat as seconds
    let secs: u64 = src
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Ok(Duration::from_secs(secs))
}
