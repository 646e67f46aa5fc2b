//! Eddystone-URL and UriBeacon service data decoding.
//!
//! Frame layout (after the service UUID):
//!
//! | byte | Eddystone-URL     | UriBeacon         |
//! |------|-------------------|-------------------|
//! | 0    | frame type `0x10` | flags (ignored)   |
//! | 1    | tx power (i8 dBm) | tx power (i8 dBm) |
//! | 2    | URL scheme code   | URL scheme code   |
//! | 3..  | encoded URL body  | encoded URL body  |
//!
//! See: https://github.com/google/eddystone/tree/master/eddystone-url

use crate::advertisement::uuid_from_u16;
use uuid::Uuid;

/// Eddystone service UUID (0xFEAA).
pub const EDDYSTONE_URL_SERVICE_UUID: Uuid = uuid_from_u16(0xFEAA);

/// Legacy UriBeacon service UUID (0xFED8).
pub const URIBEACON_SERVICE_UUID: Uuid = uuid_from_u16(0xFED8);

/// Eddystone frame type for URL frames.
pub const URL_FRAME_TYPE: u8 = 0x10;

/// Header bytes preceding the URL body: frame type/flags, tx power, scheme.
const HEADER_LEN: usize = 3;

const URL_SCHEMES: [&str; 4] = ["http://www.", "https://www.", "http://", "https://"];

const URL_EXPANSIONS: [&str; 14] = [
    ".com/", ".org/", ".edu/", ".net/", ".info/", ".biz/", ".gov/", ".com", ".org", ".edu",
    ".net", ".info", ".biz", ".gov",
];

/// A decoded URL beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EddystoneBeacon {
    /// Absolute URL with scheme and domain codes expanded.
    pub url: String,
    /// Calibrated tx power at 0 m, in dBm.
    pub tx_power_level: i8,
}

/// Decode a beacon from Eddystone-URL or UriBeacon service data.
///
/// The Eddystone payload wins when both are present. Any malformed or
/// foreign payload yields `None`; there is no other failure signal.
pub fn decode(
    url_service_data: Option<&[u8]>,
    uri_service_data: Option<&[u8]>,
) -> Option<EddystoneBeacon> {
    match (non_empty(url_service_data), non_empty(uri_service_data)) {
        (Some(data), _) => {
            if data[0] != URL_FRAME_TYPE {
                return None;
            }
            decode_url_frame(data)
        }
        // UriBeacon carries flags in byte 0, which do not affect the URL.
        (None, Some(data)) => decode_url_frame(data),
        (None, None) => None,
    }
}

fn non_empty(data: Option<&[u8]>) -> Option<&[u8]> {
    data.filter(|d| !d.is_empty())
}

fn decode_url_frame(data: &[u8]) -> Option<EddystoneBeacon> {
    if data.len() < HEADER_LEN {
        return None;
    }

    let tx_power_level = data[1] as i8;
    let scheme = URL_SCHEMES.get(usize::from(data[2]))?;
    let body = &data[HEADER_LEN..];
    if body.is_empty() {
        return None;
    }

    let mut url = String::with_capacity(scheme.len() + body.len() * 2);
    url.push_str(scheme);
    for &byte in body {
        match URL_EXPANSIONS.get(usize::from(byte)) {
            Some(expansion) => url.push_str(expansion),
            None => url.push(char::from(byte)),
        }
    }

    Some(EddystoneBeacon {
        url,
        tx_power_level,
    })
}
