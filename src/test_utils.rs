use crate::scanner::RawAdvertisement;

/// A stable hardware address for unit tests.
pub const TEST_ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

/// Advertisement listing the Eddystone UUID and carrying `header ++ body`
/// as Eddystone service data.
pub fn eddystone_advertisement(rssi: i16, header: &[u8], body: &[u8]) -> RawAdvertisement {
    let mut data = vec![
        0x02, 0x01, 0x06, // flags
        0x03, 0x03, 0xAA, 0xFE, // complete 16-bit service list
    ];
    data.push((3 + header.len() + body.len()) as u8);
    data.extend_from_slice(&[0x16, 0xAA, 0xFE]);
    data.extend_from_slice(header);
    data.extend_from_slice(body);

    RawAdvertisement {
        address: TEST_ADDRESS.to_string(),
        rssi,
        data,
    }
}

/// Advertisement from a heart rate sensor, irrelevant to the pipeline.
pub fn unrelated_advertisement() -> RawAdvertisement {
    RawAdvertisement {
        address: "11:22:33:44:55:66".to_string(),
        rssi: -80,
        data: vec![
            0x02, 0x01, 0x06, // flags
            0x03, 0x03, 0x0D, 0x18, // Heart Rate service
            0x05, 0x09, b'H', b'R', b'M', b'1', // name
        ],
    }
}
