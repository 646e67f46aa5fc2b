//! JSON lines output formatter.

use crate::device::DiscoveredDevice;
use crate::output::OutputFormatter;

/// Writes each device as `{"id":…,"url":…,"extras":{…}}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(&self, device: &DiscoveredDevice) -> Result<String, serde_json::Error> {
        serde_json::to_string(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UrlDeviceBuilder;
    use serde_json::Value;

    #[test]
    fn test_format_is_single_line_json() {
        let device = UrlDeviceBuilder::new("id", "https://example.org")
            .set_scan_time_millis(1200)
            .unwrap()
            .set_rssi(-70)
            .unwrap()
            .set_title("Lobby\nsign")
            .unwrap()
            .build();

        let line = JsonFormatter.format(&device).unwrap();
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["url"], "https://example.org");
        assert_eq!(value["extras"]["scantime"], 1200);
        assert_eq!(value["extras"]["rssi"], -70);
        assert_eq!(value["extras"]["title"], "Lobby\nsign");
    }
}
