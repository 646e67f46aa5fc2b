//! Core application runner for `eddystone-listener`.
//!
//! Decoupled from CLI parsing and process exit codes so the whole loop can be
//! driven deterministically from tests with an injected scanner and writers.

use crate::device::DiscoveredDevice;
use crate::discoverer::{RecordOptions, ScanOutcome, ScanSession};
use crate::filter::URL_BEACON_SERVICE_UUIDS;
use crate::label::Label;
use crate::output::{OutputFormat, OutputFormatter};
use crate::scanner::{Backend, RawAdvertisement, ScanError};
use crate::throttle::Throttle;
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Output format for discovered devices
    #[arg(long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// Title for the beacon with the given hardware address.
    /// Format: --title AA:BB:CC:DD:EE:FF=Lobby
    #[arg(
        long = "title",
        value_parser = crate::label::parse_label,
        value_name = "ADDRESS=TITLE"
    )]
    pub labels: Vec<Label>,

    /// Description attached to every discovered device
    #[arg(long)]
    pub description: Option<String>,

    /// Mark discovered devices as private instead of public
    #[arg(long)]
    pub private: bool,

    /// Accept advertisements regardless of their service UUIDs
    #[arg(long)]
    pub any_service: bool,

    /// Verbose output, report advertisements that were dropped and why
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Throttle output per device to at most one record per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::throttle::parse_duration)]
    pub throttle: Option<Duration>,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    /// Build the scan session these options describe.
    pub fn session(&self) -> ScanSession {
        let interest = if self.any_service {
            Vec::new()
        } else {
            URL_BEACON_SERVICE_UUIDS.to_vec()
        };
        ScanSession::new(interest).with_record_options(RecordOptions {
            labels: crate::label::to_map(&self.labels),
            description: self.description.clone(),
            public: Some(!self.private),
        })
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to format device: {0}")]
    Format(#[from] serde_json::Error),
}

/// Future returned by [`Scanner::start_scan`].
pub type ScanFuture<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RawAdvertisement>, ScanError>> + Send + 'a>>;

/// Advertisement source, so the run loop can be tested without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(&self, backend: Backend) -> ScanFuture<'_>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(&self, backend: Backend) -> ScanFuture<'_> {
        Box::pin(crate::scanner::start_scan(backend))
    }
}

fn write_device(
    formatter: &dyn OutputFormatter,
    device: &DiscoveredDevice,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let line = formatter.format(device)?;
    writeln!(out, "{line}")?;
    Ok(())
}

/// Run the scan loop, writing one line per discovered device to `out`.
///
/// - Discovered devices are optionally throttled per device id, formatted and written to `out`.
/// - Dropped beacons and rejected records are written to `err` only when `options.verbose` is true.
/// - Advertisements without a service of interest are always dropped silently.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let session = options.session();
    let formatter = options.format.formatter();
    let mut throttle = options.throttle.map(Throttle::new);

    session.begin_scan();
    let mut advertisements = scanner.start_scan(options.backend).await?;

    while let Some(advertisement) = advertisements.recv().await {
        match session.process(&advertisement) {
            ScanOutcome::Discovered(device) => {
                let should_emit = throttle
                    .as_mut()
                    .is_none_or(|t: &mut Throttle| t.should_emit(device.id()));

                if should_emit {
                    write_device(formatter.as_ref(), &device, out)?;
                }
            }
            ScanOutcome::Filtered => {
                log::trace!("{}: no service of interest", advertisement.address);
            }
            ScanOutcome::NoBeacon => {
                if options.verbose {
                    writeln!(err, "{}: no valid URL frame", advertisement.address)?;
                }
            }
            ScanOutcome::Rejected(e) => {
                if options.verbose {
                    writeln!(err, "{}: {e}", advertisement.address)?;
                } else {
                    log::warn!("{}: dropping device record: {e}", advertisement.address);
                }
            }
        }
    }

    session.end_scan();
    log::info!("advertisement stream closed");
    Ok(())
}
