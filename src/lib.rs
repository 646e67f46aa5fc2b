//! `eddystone-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. Advertisements flow through [`crate::discoverer`], which
//! parses them ([`crate::advertisement`]), filters on service UUIDs
//! ([`crate::filter`]), decodes URL frames ([`crate::eddystone`]) and builds
//! [`DiscoveredDevice`] records ([`crate::device`]). [`crate::app`] wires that
//! pipeline to a scanner backend and an output stream.

pub mod advertisement;
pub mod app;
pub mod device;
pub mod discoverer;
pub mod eddystone;
pub mod filter;
pub mod label;
pub mod output;
pub mod scanner;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{AdvertisementElement, AdvertisementFrame, parse};
pub use device::{DiscoveredDevice, SerializationError, UrlDeviceBuilder};
pub use discoverer::{DeviceReporter, RecordOptions, ScanOutcome, ScanSession};
pub use eddystone::{EDDYSTONE_URL_SERVICE_UUID, EddystoneBeacon, URIBEACON_SERVICE_UUID};
pub use filter::URL_BEACON_SERVICE_UUIDS;
pub use label::{Label, LabelMap, parse_label};
pub use output::{OutputFormat, OutputFormatter};
pub use scanner::{Backend, RawAdvertisement, ScanError};
pub use throttle::{Throttle, parse_duration};
