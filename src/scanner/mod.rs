//! BLE advertisement sources.
//!
//! Backends only deliver raw advertisements; recognizing beacons is left to
//! [`crate::discoverer`], so every backend feeds the same pipeline.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised while bringing up a backend.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The adapter, daemon or socket refused an operation
    #[error("bluetooth error: {0}")]
    Bluetooth(String),
    /// The requested backend was not compiled into this binary
    #[error("backend '{0}' is not available in this build")]
    BackendNotAvailable(String),
}

/// One received advertisement, as handed over by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement {
    /// Hardware address of the advertiser, e.g. `AA:BB:CC:DD:EE:FF`
    pub address: String,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Advertisement payload as a sequence of AD structures
    pub data: Vec<u8>,
}

/// Capacity of the channel between a backend task and the pipeline.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Advertisement sources compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ over D-Bus, needs a running bluetoothd
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket, needs CAP_NET_RAW but no daemon
    #[cfg(feature = "hci")]
    Hci,
}

#[cfg(not(any(feature = "bluer", feature = "hci")))]
compile_error!("enable at least one of the `bluer` or `hci` features");

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => "bluer",
            #[cfg(feature = "hci")]
            Backend::Hci => "hci",
        }
    }
}

impl Default for Backend {
    /// BlueZ when available, it shares the adapter with other applications.
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Backend {
    type Err = ScanError;

    /// Accepts the backend names plus the aliases `bluez` and `raw`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        match name.as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(ScanError::BackendNotAvailable(s.to_string())),
        }
    }
}

/// Start delivering advertisements from the given backend.
///
/// The backend runs in a spawned task until the receiver is dropped or the
/// adapter goes away.
pub async fn start_scan(backend: Backend) -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    log::info!("starting {backend} scanner");
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan().await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan().await,
    }
}
