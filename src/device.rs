//! Discovered URL device records.
//!
//! A [`DiscoveredDevice`] is an id, a URL and a bag of named extras. The
//! extras hold everything else the discovery mechanism knows about the device
//! (signal strength, tx power, scan time, ...) as primitive JSON values, so
//! records from different discovery mechanisms share one shape.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Ordered extras map. Keys are unique; insertion order is kept.
pub type Extras = serde_json::Map<String, Value>;

pub const SCANTIME_KEY: &str = "scantime";
pub const TYPE_KEY: &str = "type";
pub const PUBLIC_KEY: &str = "public";
pub const TITLE_KEY: &str = "title";
pub const DESCRIPTION_KEY: &str = "description";
pub const RSSI_KEY: &str = "rssi";
pub const TXPOWER_KEY: &str = "tx";

/// Device type tag for devices discovered over BLE advertisements.
pub const DEVICE_TYPE_BLE: &str = "ble";

/// Errors raised when a value cannot be stored as an extra.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// Value serialized to null, an array or an object
    #[error("extra '{key}' is not a string, number or boolean")]
    NotPrimitive { key: String },
    /// Serializer rejected the value
    #[error("extra '{key}' could not be serialized: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A device discovered during a scan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    id: String,
    url: String,
    extras: Extras,
}

impl DiscoveredDevice {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Received signal strength in dBm.
    pub fn rssi(&self) -> Option<i32> {
        self.extra_i32(RSSI_KEY)
    }

    /// Calibrated tx power at 0 m in dBm.
    pub fn tx_power(&self) -> Option<i32> {
        self.extra_i32(TXPOWER_KEY)
    }

    pub fn device_type(&self) -> Option<&str> {
        self.extra(TYPE_KEY).and_then(Value::as_str)
    }

    /// Milliseconds between scan start and discovery.
    pub fn scan_time_millis(&self) -> Option<u64> {
        self.extra(SCANTIME_KEY).and_then(Value::as_u64)
    }

    pub fn title(&self) -> Option<&str> {
        self.extra(TITLE_KEY).and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.extra(DESCRIPTION_KEY).and_then(Value::as_str)
    }

    pub fn is_public(&self) -> Option<bool> {
        self.extra(PUBLIC_KEY).and_then(Value::as_bool)
    }

    fn extra_i32(&self, key: &str) -> Option<i32> {
        self.extra(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }
}

/// Builder for [`DiscoveredDevice`].
///
/// Every setter stores one extra and hands the builder back, so calls chain
/// with `?`:
///
/// ```
/// use eddystone_listener::device::UrlDeviceBuilder;
///
/// # fn main() -> Result<(), eddystone_listener::device::SerializationError> {
/// let device = UrlDeviceBuilder::new("id", "https://example.org")
///     .set_rssi(-70)?
///     .set_device_type("ble")?
///     .build();
/// assert_eq!(device.rssi(), Some(-70));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UrlDeviceBuilder {
    id: String,
    url: String,
    extras: Extras,
}

impl UrlDeviceBuilder {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            extras: Extras::new(),
        }
    }

    /// Store `value` under `key`, replacing any earlier value.
    pub fn add_extra<V: Serialize>(
        mut self,
        key: &str,
        value: V,
    ) -> Result<Self, SerializationError> {
        let value = serde_json::to_value(value).map_err(|source| SerializationError::Json {
            key: key.to_string(),
            source,
        })?;

        match value {
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                self.extras.insert(key.to_string(), value);
                Ok(self)
            }
            // Non-finite floats serialize to null
            Value::Null | Value::Array(_) | Value::Object(_) => {
                Err(SerializationError::NotPrimitive {
                    key: key.to_string(),
                })
            }
        }
    }

    pub fn set_device_type(self, device_type: &str) -> Result<Self, SerializationError> {
        self.add_extra(TYPE_KEY, device_type)
    }

    pub fn set_scan_time_millis(self, millis: u64) -> Result<Self, SerializationError> {
        self.add_extra(SCANTIME_KEY, millis)
    }

    pub fn set_private(self) -> Result<Self, SerializationError> {
        self.add_extra(PUBLIC_KEY, false)
    }

    pub fn set_public(self) -> Result<Self, SerializationError> {
        self.add_extra(PUBLIC_KEY, true)
    }

    pub fn set_title(self, title: &str) -> Result<Self, SerializationError> {
        self.add_extra(TITLE_KEY, title)
    }

    pub fn set_description(self, description: &str) -> Result<Self, SerializationError> {
        self.add_extra(DESCRIPTION_KEY, description)
    }

    pub fn set_rssi(self, rssi: i32) -> Result<Self, SerializationError> {
        self.add_extra(RSSI_KEY, rssi)
    }

    pub fn set_tx_power(self, tx_power: i32) -> Result<Self, SerializationError> {
        self.add_extra(TXPOWER_KEY, tx_power)
    }

    pub fn build(self) -> DiscoveredDevice {
        DiscoveredDevice {
            id: self.id,
            url: self.url,
            extras: self.extras,
        }
    }
}
