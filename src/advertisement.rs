//! BLE advertisement data parsing.
//!
//! An advertisement payload is a sequence of length-prefixed AD structures:
//! one length byte `L`, one AD type byte, then `L - 1` bytes of payload. This
//! module splits that stream into [`AdvertisementElement`]s and collects the
//! parts the beacon pipeline cares about into an [`AdvertisementFrame`].
//!
//! Parsing is best-effort. Scanners see plenty of truncated and malformed
//! packets, so a bad length simply ends the parse and whatever was consumed
//! up to that point is kept.

use uuid::Uuid;

/// Bluetooth Base UUID used to expand 16-bit and 32-bit service UUIDs.
/// See: https://www.bluetooth.com/specifications/assigned-numbers/
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

// AD types
pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_INCOMPLETE_16_SERVICE_LIST: u8 = 0x02;
pub const AD_TYPE_COMPLETE_16_SERVICE_LIST: u8 = 0x03;
pub const AD_TYPE_INCOMPLETE_32_SERVICE_LIST: u8 = 0x04;
pub const AD_TYPE_COMPLETE_32_SERVICE_LIST: u8 = 0x05;
pub const AD_TYPE_INCOMPLETE_128_SERVICE_LIST: u8 = 0x06;
pub const AD_TYPE_COMPLETE_128_SERVICE_LIST: u8 = 0x07;
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
pub const AD_TYPE_FULL_NAME: u8 = 0x09;
pub const AD_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
pub const AD_TYPE_SERVICE_DATA_32: u8 = 0x20;
pub const AD_TYPE_SERVICE_DATA_128: u8 = 0x21;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Expand a 16-bit Bluetooth UUID into its 128-bit form.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Expand a 32-bit Bluetooth UUID into its 128-bit form.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Returns the 16-bit alias of `uuid` if it lies on the Bluetooth base.
pub fn uuid_to_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let on_base = (value & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID;
    let upper = (value >> 96) as u32;
    (on_base && upper <= u32::from(u16::MAX)).then_some(upper as u16)
}

/// Decode a little-endian UUID of 2, 4 or 16 bytes.
fn uuid_from_le_bytes(bytes: &[u8]) -> Option<Uuid> {
    match bytes.len() {
        2 => Some(uuid_from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
        4 => Some(uuid_from_u32(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        16 => {
            let mut be = [0u8; 16];
            be.copy_from_slice(bytes);
            be.reverse();
            Some(Uuid::from_bytes(be))
        }
        _ => None,
    }
}

/// A single AD structure from an advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementElement {
    pub type_code: u8,
    pub payload: Vec<u8>,
}

impl AdvertisementElement {
    pub fn new(type_code: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_code,
            payload: payload.into(),
        }
    }

    /// Append this element to `out` in length/type/payload wire form.
    ///
    /// Payloads longer than 254 bytes cannot be represented by a single
    /// length byte and are truncated.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let payload = &self.payload[..self.payload.len().min(254)];
        out.push(payload.len() as u8 + 1);
        out.push(self.type_code);
        out.extend_from_slice(payload);
    }
}

/// Everything the pipeline extracts from one advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementFrame {
    /// All elements in broadcast order.
    pub elements: Vec<AdvertisementElement>,
    /// Service UUIDs from complete and incomplete lists, expanded to 128 bits.
    pub service_uuids: Vec<Uuid>,
    /// Service data keyed by expanded UUID, in broadcast order.
    pub service_data: Vec<(Uuid, Vec<u8>)>,
    pub flags: Option<u8>,
    pub local_name: Option<String>,
    pub tx_power_level: Option<i8>,
    /// Manufacturer specific data keyed by company identifier.
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
}

impl AdvertisementFrame {
    /// Service data for `uuid`. The first entry wins when a UUID repeats.
    pub fn service_data(&self, uuid: &Uuid) -> Option<&[u8]> {
        self.service_data
            .iter()
            .find(|(key, _)| key == uuid)
            .map(|(_, data)| data.as_slice())
    }

    pub fn has_service_uuid(&self, uuid: &Uuid) -> bool {
        self.service_uuids.contains(uuid)
    }

    fn absorb(&mut self, element: AdvertisementElement) {
        let payload = element.payload.as_slice();
        match element.type_code {
            AD_TYPE_FLAGS => self.flags = payload.first().copied(),
            AD_TYPE_INCOMPLETE_16_SERVICE_LIST | AD_TYPE_COMPLETE_16_SERVICE_LIST => {
                self.push_uuid_list(payload, 2)
            }
            AD_TYPE_INCOMPLETE_32_SERVICE_LIST | AD_TYPE_COMPLETE_32_SERVICE_LIST => {
                self.push_uuid_list(payload, 4)
            }
            AD_TYPE_INCOMPLETE_128_SERVICE_LIST | AD_TYPE_COMPLETE_128_SERVICE_LIST => {
                self.push_uuid_list(payload, 16)
            }
            AD_TYPE_FULL_NAME => {
                self.local_name = Some(String::from_utf8_lossy(payload).into_owned())
            }
            // A complete name always takes precedence over a shortened one.
            AD_TYPE_SHORT_NAME if self.local_name.is_none() => {
                self.local_name = Some(String::from_utf8_lossy(payload).into_owned())
            }
            AD_TYPE_TX_POWER_LEVEL => self.tx_power_level = payload.first().map(|&b| b as i8),
            AD_TYPE_SERVICE_DATA_16 => self.push_service_data(payload, 2),
            AD_TYPE_SERVICE_DATA_32 => self.push_service_data(payload, 4),
            AD_TYPE_SERVICE_DATA_128 => self.push_service_data(payload, 16),
            AD_TYPE_MANUFACTURER_DATA if payload.len() >= 2 => {
                let company = u16::from_le_bytes([payload[0], payload[1]]);
                self.manufacturer_data.push((company, payload[2..].to_vec()));
            }
            _ => {}
        }
        self.elements.push(element);
    }

    fn push_uuid_list(&mut self, payload: &[u8], width: usize) {
        self.service_uuids
            .extend(payload.chunks_exact(width).filter_map(uuid_from_le_bytes));
    }

    fn push_service_data(&mut self, payload: &[u8], width: usize) {
        if payload.len() < width {
            return;
        }
        let (uuid, data) = payload.split_at(width);
        if let Some(uuid) = uuid_from_le_bytes(uuid) {
            self.service_data.push((uuid, data.to_vec()));
        }
    }
}

/// Split raw advertisement bytes into elements.
///
/// Never fails. Parsing stops at a zero length byte or at the first element
/// whose declared length runs past the end of the buffer.
pub fn parse(raw: &[u8]) -> AdvertisementFrame {
    let mut frame = AdvertisementFrame::default();
    let mut offset = 0;

    while offset < raw.len() {
        let len = raw[offset] as usize;
        if len == 0 || offset + len >= raw.len() {
            break;
        }

        let type_code = raw[offset + 1];
        let payload = &raw[offset + 2..offset + 1 + len];
        frame.absorb(AdvertisementElement::new(type_code, payload));

        offset += 1 + len;
    }

    frame
}
