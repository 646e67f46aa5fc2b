//! Raw HCI socket backend.
//!
//! Uses raw Linux HCI sockets to receive LE advertising reports without the
//! BlueZ daemon. Requires CAP_NET_RAW and CAP_NET_ADMIN capabilities or root
//! privileges.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, RawAdvertisement, ScanError};
use libc::{
    AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t,
};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

// Packet type indicators
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

const HCI_DEV: u16 = 0;
const HCI_MAX_EVENT_SIZE: usize = 260;

// Scan timing in 0.625ms units
const SCAN_INTERVAL: u16 = 0x0010;
const SCAN_WINDOW: u16 = 0x0010;

// Offsets inside an LE advertising report, after the 4-byte event header
const REPORT_ADDRESS: usize = 3;
const REPORT_DATA_LEN: usize = 9;
const REPORT_DATA: usize = 10;

#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// Kernel-side packet filter, see `struct hci_filter` in BlueZ.
#[repr(C)]
#[derive(Debug, Default, PartialEq, Eq)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    /// Filter passing only LE meta events.
    fn le_meta_events() -> Self {
        let mut filter = Self::default();
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

/// Command packet: type byte, little-endian opcode, parameter length, parameters.
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let [opcode_lo, opcode_hi] = ((ogf << 10) | ocf).to_le_bytes();
    let mut packet = vec![HCI_COMMAND_PKT, opcode_lo, opcode_hi, params.len() as u8];
    packet.extend_from_slice(params);
    packet
}

/// Map a negative libc return value to a `ScanError` carrying errno.
fn check(ret: isize, action: &str) -> Result<usize, ScanError> {
    if ret < 0 {
        Err(ScanError::Bluetooth(format!(
            "{action}: {}",
            io::Error::last_os_error()
        )))
    } else {
        Ok(ret as usize)
    }
}

/// A raw, non-blocking HCI socket bound to one controller.
struct HciSocket {
    fd: OwnedFd,
}

impl HciSocket {
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK so the fd can be driven by AsyncFd
        let raw = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        check(raw as isize, "failed to create HCI socket")?;
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
        };

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                socket.fd.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        check(ret as isize, "failed to bind HCI socket")?;

        Ok(socket)
    }

    fn set_filter(&self, filter: &HciFilter) -> Result<(), ScanError> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        check(ret as isize, "failed to set HCI filter").map(drop)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
            )
        };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }

    fn send_command(&self, ogf: u16, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = hci_command_packet(ogf, ocf, params);
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        check(ret, "failed to send HCI command").map(drop)
    }

    /// Enable or disable LE scanning. Duplicates are never filtered, every
    /// advertisement counts as a fresh sighting.
    fn set_le_scan_enable(&self, enable: bool) -> Result<(), ScanError> {
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[u8::from(enable), 0x00])
    }

    fn start_le_scan(&self) -> Result<(), ScanError> {
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, &scan_parameters())?;
        self.set_le_scan_enable(true)
    }
}

/// Parameters for LE Set Scan Parameters: passive scan, 10ms interval, 10ms window.
fn scan_parameters() -> [u8; 7] {
    let [interval_lo, interval_hi] = SCAN_INTERVAL.to_le_bytes();
    let [window_lo, window_hi] = SCAN_WINDOW.to_le_bytes();
    [
        LE_SCAN_PASSIVE,
        interval_lo,
        interval_hi,
        window_lo,
        window_hi,
        LE_PUBLIC_ADDRESS,
        FILTER_POLICY_ACCEPT_ALL,
    ]
}

/// Format a little-endian HCI address as `AA:BB:CC:DD:EE:FF`.
fn format_address(le: &[u8]) -> String {
    le.iter()
        .rev()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse the first report of an LE advertising report event.
///
/// `event` is the full HCI event packet including the packet type byte.
fn parse_advertising_report(event: &[u8]) -> Option<RawAdvertisement> {
    // Skip HCI header (packet type, event code, param len, subevent)
    let report = event.get(4..)?;

    let num_reports = *report.first()?;
    if num_reports == 0 {
        return None;
    }

    let address = report.get(REPORT_ADDRESS..REPORT_ADDRESS + 6)?;
    let data_len = *report.get(REPORT_DATA_LEN)? as usize;
    let data = report.get(REPORT_DATA..REPORT_DATA + data_len)?;
    // RSSI trails the advertisement data
    let rssi = *report.get(REPORT_DATA + data_len)? as i8;

    Some(RawAdvertisement {
        address: format_address(address),
        rssi: i16::from(rssi),
        data: data.to_vec(),
    })
}

/// Start receiving advertisements using raw HCI sockets.
///
/// Opens a raw HCI socket, enables passive LE scanning and forwards every
/// advertising report through the returned channel.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan() -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let events = HciSocket::open(HCI_DEV)?;
    events.set_filter(&HciFilter::le_meta_events())?;

    // Commands go through a separate socket bound to the same device
    let commands = HciSocket::open(HCI_DEV)?;
    commands.start_le_scan()?;

    let events = AsyncFd::new(events)
        .map_err(|e| ScanError::Bluetooth(format!("failed to register HCI socket: {e}")))?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        forward_reports(&events, &tx).await;
        if let Err(e) = commands.set_le_scan_enable(false) {
            log::warn!("failed to disable LE scan: {e}");
        }
    });

    Ok(rx)
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Decode an HCI packet if it is an LE advertising report event.
fn advertising_report(packet: &[u8]) -> Option<RawAdvertisement> {
    match packet {
        [HCI_EVENT_PKT, EVT_LE_META_EVENT, _, EVT_LE_ADVERTISING_REPORT, ..] => {
            parse_advertising_report(packet)
        }
        _ => None,
    }
}

/// Forward advertising reports until the socket fails or the receiver is dropped.
async fn forward_reports(events: &AsyncFd<HciSocket>, tx: &mpsc::Sender<RawAdvertisement>) {
    let mut buf = [0u8; HCI_MAX_EVENT_SIZE];

    loop {
        let mut guard = match events.readable().await {
            Ok(guard) => guard,
            Err(e) => {
                log::error!("HCI socket is no longer readable: {e}");
                return;
            }
        };

        // Drain the socket, then wait for readiness again
        loop {
            let n = match guard.try_io(|socket| socket.get_ref().read(&mut buf)) {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    log::warn!("HCI read failed: {e}");
                    break;
                }
            };

            let Some(advertisement) = advertising_report(&buf[..n]) else {
                log::trace!("ignoring {n} byte HCI packet");
                continue;
            };
            if tx.send(advertisement).await.is_err() {
                log::debug!("advertisement receiver dropped, stopping HCI scan");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_event(address_le: [u8; 6], data: &[u8], rssi: i8) -> Vec<u8> {
        let mut event = vec![HCI_EVENT_PKT, EVT_LE_META_EVENT, 0, EVT_LE_ADVERTISING_REPORT];
        event.push(1); // num reports
        event.push(0x03); // ADV_NONCONN_IND
        event.push(0x01); // random address
        event.extend_from_slice(&address_le);
        event.push(data.len() as u8);
        event.extend_from_slice(data);
        event.push(rssi as u8);
        event[2] = (event.len() - 3) as u8;
        event
    }

    #[test]
    fn test_hci_filter_setup() {
        let filter = HciFilter::le_meta_events();

        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask, [0, 1 << (EVT_LE_META_EVENT % 32)]);
        assert_eq!(filter.opcode, 0);
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(packet[1], 0x0C); // opcode 0x200C, little-endian
        assert_eq!(packet[2], 0x20);
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    #[test]
    fn test_scan_parameters() {
        assert_eq!(scan_parameters(), [0x00, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_advertising_report() {
        let data = [0x03, 0x03, 0xAA, 0xFE];
        let event = report_event([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA], &data, -67);

        let advertisement = parse_advertising_report(&event).unwrap();
        assert_eq!(advertisement.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(advertisement.rssi, -67);
        assert_eq!(advertisement.data, data);
    }

    #[test]
    fn test_advertising_report_ignores_other_events() {
        let data = [0x02, 0x01, 0x06];
        let event = report_event([1, 2, 3, 4, 5, 6], &data, -40);
        assert!(advertising_report(&event).is_some());

        let mut connection_complete = event.clone();
        connection_complete[3] = 0x01;
        assert_eq!(advertising_report(&connection_complete), None);
        assert_eq!(advertising_report(&[HCI_EVENT_PKT, 0x0E, 0x04]), None);
        assert_eq!(advertising_report(&[]), None);
    }

    #[test]
    fn test_parse_advertising_report_empty_data() {
        let event = report_event([1, 2, 3, 4, 5, 6], &[], -90);
        let advertisement = parse_advertising_report(&event).unwrap();
        assert!(advertisement.data.is_empty());
        assert_eq!(advertisement.rssi, -90);
    }

    #[test]
    fn test_parse_advertising_report_truncated() {
        let event = report_event([1, 2, 3, 4, 5, 6], &[0x03, 0x03, 0xAA, 0xFE], -50);
        // Missing RSSI byte
        assert_eq!(parse_advertising_report(&event[..event.len() - 1]), None);
        // Missing part of the data
        assert_eq!(parse_advertising_report(&event[..event.len() - 3]), None);
        assert_eq!(parse_advertising_report(&event[..6]), None);
    }

    #[test]
    fn test_parse_advertising_report_no_reports() {
        let mut event = report_event([1, 2, 3, 4, 5, 6], &[], -50);
        event[4] = 0;
        assert_eq!(parse_advertising_report(&event), None);
    }
}
