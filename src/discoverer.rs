//! URL beacon discovery pipeline.
//!
//! A [`ScanSession`] turns raw advertisements into [`DiscoveredDevice`]
//! records: parse → filter on service UUIDs → decode the URL frame → build
//! the record. Each advertisement is handled independently; the session only
//! shares the scan start time, so it can be used from several tasks at once.
//!
//! Nothing in the pipeline is fatal. Foreign packets, malformed beacons and
//! records that fail to serialize are dropped and the scan carries on.

use crate::advertisement::{self, AdvertisementFrame};
use crate::device::{DEVICE_TYPE_BLE, DiscoveredDevice, SerializationError, UrlDeviceBuilder};
use crate::eddystone::{
    self, EDDYSTONE_URL_SERVICE_UUID, EddystoneBeacon, URIBEACON_SERVICE_UUID,
};
use crate::filter::{self, URL_BEACON_SERVICE_UUIDS};
use crate::label::{self, LabelMap};
use crate::scanner::RawAdvertisement;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use uuid::Uuid;

const DEVICE_ID_PREFIX: &str = "ble-url";

/// Marker for "no scan has begun yet".
const NOT_STARTED: u64 = u64::MAX;

/// Receiver of discovered devices.
pub trait DeviceReporter {
    fn report_url_device(&mut self, device: DiscoveredDevice);
}

impl<F: FnMut(DiscoveredDevice)> DeviceReporter for F {
    fn report_url_device(&mut self, device: DiscoveredDevice) {
        self(device)
    }
}

/// What happened to one advertisement.
#[derive(Debug)]
pub enum ScanOutcome {
    Discovered(DiscoveredDevice),
    /// No service UUID of interest
    Filtered,
    /// Missing or malformed URL frame
    NoBeacon,
    /// The record could not be built
    Rejected(SerializationError),
}

/// Extras applied to every record, on top of the per-advertisement ones.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Titles by hardware address
    pub labels: LabelMap,
    pub description: Option<String>,
    /// `Some(true)` marks records public, `Some(false)` private
    pub public: Option<bool>,
}

/// State for one scanning session.
#[derive(Debug)]
pub struct ScanSession {
    interest: Vec<Uuid>,
    record_options: RecordOptions,
    epoch: Instant,
    /// Nanoseconds after `epoch` at which the current scan began
    scan_start: AtomicU64,
    scanning: AtomicBool,
    lifecycle: Mutex<()>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(URL_BEACON_SERVICE_UUIDS.to_vec())
    }
}

impl ScanSession {
    /// Create a session that only accepts advertisements listing one of
    /// `interest`. An empty interest set accepts everything.
    pub fn new(interest: Vec<Uuid>) -> Self {
        Self {
            interest,
            record_options: RecordOptions::default(),
            epoch: Instant::now(),
            scan_start: AtomicU64::new(NOT_STARTED),
            scanning: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_record_options(mut self, record_options: RecordOptions) -> Self {
        self.record_options = record_options;
        self
    }

    pub fn interest(&self) -> &[Uuid] {
        &self.interest
    }

    /// Mark the start of a scan. Scan times are measured from here.
    pub fn begin_scan(&self) {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.epoch.elapsed().as_nanos() as u64;
        self.scan_start.store(now, Ordering::Release);
        self.scanning.store(true, Ordering::Release);
        log::debug!("scan started");
    }

    /// Mark the end of a scan. The last start time stays readable.
    pub fn end_scan(&self) {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.scanning.store(false, Ordering::Release);
        log::debug!("scan ended after {} ms", self.scan_elapsed_millis());
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Milliseconds since the last [`begin_scan`](Self::begin_scan), or 0 if
    /// no scan has begun.
    pub fn scan_elapsed_millis(&self) -> u64 {
        let start = self.scan_start.load(Ordering::Acquire);
        if start == NOT_STARTED {
            return 0;
        }
        let now = self.epoch.elapsed().as_nanos() as u64;
        now.saturating_sub(start) / 1_000_000
    }

    /// Run one advertisement through the pipeline.
    pub fn process(&self, advertisement: &RawAdvertisement) -> ScanOutcome {
        let frame = advertisement::parse(&advertisement.data);
        if !filter::matches(&frame, &self.interest) {
            return ScanOutcome::Filtered;
        }

        let Some(beacon) = decode_beacon(&frame) else {
            return ScanOutcome::NoBeacon;
        };

        match self.build_device(advertisement, &beacon) {
            Ok(device) => ScanOutcome::Discovered(device),
            Err(e) => ScanOutcome::Rejected(e),
        }
    }

    /// Run one advertisement through the pipeline and report the device, if any.
    ///
    /// Returns `true` if a device was reported.
    pub fn on_advertisement(
        &self,
        advertisement: &RawAdvertisement,
        reporter: &mut dyn DeviceReporter,
    ) -> bool {
        match self.process(advertisement) {
            ScanOutcome::Discovered(device) => {
                reporter.report_url_device(device);
                true
            }
            ScanOutcome::Filtered => {
                log::trace!("{}: no service of interest", advertisement.address);
                false
            }
            ScanOutcome::NoBeacon => {
                log::debug!("{}: no valid URL frame", advertisement.address);
                false
            }
            ScanOutcome::Rejected(e) => {
                log::warn!("{}: dropping device record: {e}", advertisement.address);
                false
            }
        }
    }

    /// Start a record with the id, url and scan time filled in.
    pub fn create_url_device_builder(
        &self,
        id: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<UrlDeviceBuilder, SerializationError> {
        UrlDeviceBuilder::new(id, url).set_scan_time_millis(self.scan_elapsed_millis())
    }

    fn build_device(
        &self,
        advertisement: &RawAdvertisement,
        beacon: &EddystoneBeacon,
    ) -> Result<DiscoveredDevice, SerializationError> {
        let id = device_id(&advertisement.address, &beacon.url);
        let mut builder = self
            .create_url_device_builder(id, beacon.url.as_str())?
            .set_rssi(i32::from(advertisement.rssi))?
            .set_tx_power(i32::from(beacon.tx_power_level))?
            .set_device_type(DEVICE_TYPE_BLE)?;

        let options = &self.record_options;
        if let Some(title) = label::resolve_title(&advertisement.address, &options.labels) {
            builder = builder.set_title(title)?;
        }
        if let Some(description) = &options.description {
            builder = builder.set_description(description)?;
        }
        builder = match options.public {
            Some(true) => builder.set_public()?,
            Some(false) => builder.set_private()?,
            None => builder,
        };

        Ok(builder.build())
    }
}

fn decode_beacon(frame: &AdvertisementFrame) -> Option<EddystoneBeacon> {
    eddystone::decode(
        frame.service_data(&EDDYSTONE_URL_SERVICE_UUID),
        frame.service_data(&URIBEACON_SERVICE_UUID),
    )
}

/// Identifier unique per hardware address and URL.
pub fn device_id(address: &str, url: &str) -> String {
    format!("{DEVICE_ID_PREFIX}:{address}:{url}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RSSI_KEY, SCANTIME_KEY, TXPOWER_KEY, TYPE_KEY};
    use crate::label::parse_label;
    use crate::test_utils::{TEST_ADDRESS, eddystone_advertisement, unrelated_advertisement};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_end_to_end_eddystone() {
        let session = ScanSession::default();
        session.begin_scan();

        let mut devices = Vec::new();
        let reported = session.on_advertisement(
            &eddystone_advertisement(-70, &[0x10, 0xEC, 0x03], b"example\x08"),
            &mut |device: DiscoveredDevice| devices.push(device),
        );

        assert!(reported);
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.url(), "https://example.org");
        assert_eq!(device.rssi(), Some(-70));
        assert_eq!(device.tx_power(), Some(-20));
        assert_eq!(device.device_type(), Some("ble"));
        assert!(device.scan_time_millis().is_some());
        assert_eq!(device.id(), device_id(TEST_ADDRESS, "https://example.org"));

        let keys: Vec<&str> = device.extras().keys().map(String::as_str).collect();
        assert_eq!(keys, vec![SCANTIME_KEY, RSSI_KEY, TXPOWER_KEY, TYPE_KEY]);
    }

    #[test]
    fn test_unrelated_advertisement_is_filtered() {
        let session = ScanSession::default();
        let mut devices = Vec::new();
        let reported =
            session.on_advertisement(&unrelated_advertisement(), &mut |d: DiscoveredDevice| {
                devices.push(d)
            });

        assert!(!reported);
        assert!(devices.is_empty());
        assert!(matches!(
            session.process(&unrelated_advertisement()),
            ScanOutcome::Filtered
        ));
    }

    #[test]
    fn test_pass_through_filter_still_needs_beacon() {
        let session = ScanSession::new(vec![]);
        assert!(matches!(
            session.process(&unrelated_advertisement()),
            ScanOutcome::NoBeacon
        ));
    }

    #[test]
    fn test_invalid_frame_is_no_beacon() {
        let session = ScanSession::default();
        let advertisement = eddystone_advertisement(-70, &[0x10, 0x00, 0x09], b"example");
        assert!(matches!(
            session.process(&advertisement),
            ScanOutcome::NoBeacon
        ));
    }

    #[test]
    fn test_uribeacon_advertisement() {
        let session = ScanSession::default();
        let raw = RawAdvertisement {
            address: TEST_ADDRESS.to_string(),
            rssi: -55,
            data: vec![
                0x03, 0x03, 0xD8, 0xFE, // UriBeacon UUID
                0x09, 0x16, 0xD8, 0xFE, 0x00, 0xF6, 0x02, b'a', b'b', 0x07,
            ],
        };

        match session.process(&raw) {
            ScanOutcome::Discovered(device) => {
                assert_eq!(device.url(), "http://ab.com");
                assert_eq!(device.tx_power(), Some(-10));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_record_options() {
        let labels = crate::label::to_map(&[parse_label("aa:bb:cc:dd:ee:ff=Lobby").unwrap()]);
        let session = ScanSession::default().with_record_options(RecordOptions {
            labels,
            description: Some("Front desk".to_string()),
            public: Some(false),
        });

        let ScanOutcome::Discovered(device) =
            session.process(&eddystone_advertisement(-40, &[0x10, 0x00, 0x03], b"x\x07"))
        else {
            panic!("expected a device");
        };
        assert_eq!(device.title(), Some("Lobby"));
        assert_eq!(device.description(), Some("Front desk"));
        assert_eq!(device.is_public(), Some(false));
    }

    #[test]
    fn test_scan_elapsed_before_begin() {
        let session = ScanSession::default();
        assert_eq!(session.scan_elapsed_millis(), 0);
        assert!(!session.is_scanning());
    }

    #[test]
    fn test_scan_lifecycle() {
        let session = ScanSession::default();
        session.begin_scan();
        assert!(session.is_scanning());

        std::thread::sleep(Duration::from_millis(20));
        let elapsed = session.scan_elapsed_millis();
        assert!(elapsed >= 20, "elapsed {elapsed}");

        session.end_scan();
        assert!(!session.is_scanning());
        assert!(session.scan_elapsed_millis() >= elapsed);

        // A new scan restarts the clock
        session.begin_scan();
        assert!(session.scan_elapsed_millis() < elapsed);
    }

    #[test]
    fn test_session_is_shared_across_threads() {
        let session = Arc::new(ScanSession::default());
        session.begin_scan();

        let handles: Vec<_> = (0..4i16)
            .map(|i| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    let advertisement =
                        eddystone_advertisement(-60 - i, &[0x10, 0x00, 0x03], b"example\x07");
                    matches!(session.process(&advertisement), ScanOutcome::Discovered(_))
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_device_id_depends_on_address_and_url() {
        assert_ne!(
            device_id("AA:BB:CC:DD:EE:FF", "https://a.com"),
            device_id("AA:BB:CC:DD:EE:FF", "https://b.com")
        );
        assert_ne!(
            device_id("AA:BB:CC:DD:EE:FF", "https://a.com"),
            device_id("11:22:33:44:55:66", "https://a.com")
        );
    }
}
