//! BlueZ D-Bus backend.
//!
//! Uses the `bluer` crate to talk to the BlueZ daemon; `bluetoothd` must be
//! running. BlueZ does not expose raw advertisement bytes, only the parsed
//! device properties, so those are serialized back into AD structures before
//! they are handed to the pipeline.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, RawAdvertisement, ScanError};
use crate::advertisement::{
    AD_TYPE_COMPLETE_16_SERVICE_LIST, AD_TYPE_COMPLETE_128_SERVICE_LIST, AD_TYPE_SERVICE_DATA_16,
    AD_TYPE_SERVICE_DATA_128, AdvertisementElement, uuid_to_u16,
};
use crate::filter::URL_BEACON_SERVICE_UUIDS;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session, Uuid};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Monitor patterns matching 16-bit service data for each beacon UUID.
fn beacon_patterns() -> Vec<Pattern> {
    URL_BEACON_SERVICE_UUIDS
        .iter()
        .filter_map(uuid_to_u16)
        .map(|short| Pattern {
            data_type: AD_TYPE_SERVICE_DATA_16,
            start_position: 0,
            content: short.to_le_bytes().to_vec(),
        })
        .collect()
}

/// Start receiving advertisements through BlueZ.
///
/// Registers an advertisement monitor for beacon service data and forwards
/// every device it reports through the returned channel.
pub async fn start_scan() -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(beacon_patterns()),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            let MonitorEvent::DeviceFound(device_id) = event else {
                continue;
            };
            match read_advertisement(&adapter, device_id.device).await {
                Ok(Some(advertisement)) => {
                    if tx.send(advertisement).await.is_err() {
                        log::debug!("advertisement receiver dropped, stopping BlueZ scan");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => log::debug!("failed to read device {}: {e}", device_id.device),
            }
        }
    });

    Ok(rx)
}

/// Read the advertised properties of a device.
///
/// Returns `None` if BlueZ has no RSSI for the device, i.e. it was not
/// seen in a recent advertisement.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<RawAdvertisement>, ScanError> {
    let device = adapter.device(address)?;

    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };
    let uuids: Vec<Uuid> = device.uuids().await?.unwrap_or_default().into_iter().collect();
    let service_data = device.service_data().await?.unwrap_or_default();

    Ok(Some(RawAdvertisement {
        address: address.to_string(),
        rssi,
        data: encode_properties(&uuids, &service_data),
    }))
}

fn uuid_le_bytes(uuid: &Uuid) -> Vec<u8> {
    match uuid_to_u16(uuid) {
        Some(short) => short.to_le_bytes().to_vec(),
        None => {
            let mut bytes = uuid.as_bytes().to_vec();
            bytes.reverse();
            bytes
        }
    }
}

/// Serialize service UUIDs and service data into AD structures.
fn encode_properties(uuids: &[Uuid], service_data: &HashMap<Uuid, Vec<u8>>) -> Vec<u8> {
    let mut short_list = Vec::new();
    let mut long_list = Vec::new();
    let mut sorted_uuids = uuids.to_vec();
    sorted_uuids.sort();
    for uuid in &sorted_uuids {
        match uuid_to_u16(uuid) {
            Some(short) => short_list.extend_from_slice(&short.to_le_bytes()),
            None => long_list.extend(uuid_le_bytes(uuid)),
        }
    }

    let mut elements = Vec::new();
    if !short_list.is_empty() {
        elements.push(AdvertisementElement::new(
            AD_TYPE_COMPLETE_16_SERVICE_LIST,
            short_list,
        ));
    }
    if !long_list.is_empty() {
        elements.push(AdvertisementElement::new(
            AD_TYPE_COMPLETE_128_SERVICE_LIST,
            long_list,
        ));
    }

    let mut entries: Vec<_> = service_data.iter().collect();
    entries.sort_by_key(|(uuid, _)| **uuid);
    for (uuid, data) in entries {
        let type_code = if uuid_to_u16(uuid).is_some() {
            AD_TYPE_SERVICE_DATA_16
        } else {
            AD_TYPE_SERVICE_DATA_128
        };
        let mut payload = uuid_le_bytes(uuid);
        payload.extend_from_slice(data);
        elements.push(AdvertisementElement::new(type_code, payload));
    }

    let mut raw = Vec::new();
    for element in &elements {
        element.encode(&mut raw);
    }
    raw
}
