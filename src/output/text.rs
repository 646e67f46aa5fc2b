//! Plain text output formatter.

use crate::device::DiscoveredDevice;
use crate::output::OutputFormatter;
use std::fmt::Write;

/// Writes `<url> rssi=<dBm> tx=<dBm> scantime=<ms>ms`, followed by the
/// title in quotes when one is set. Missing values are left out.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format(&self, device: &DiscoveredDevice) -> Result<String, serde_json::Error> {
        let mut line = String::from(device.url());
        // Writing to a String cannot fail
        if let Some(rssi) = device.rssi() {
            let _ = write!(line, " rssi={rssi}");
        }
        if let Some(tx) = device.tx_power() {
            let _ = write!(line, " tx={tx}");
        }
        if let Some(millis) = device.scan_time_millis() {
            let _ = write!(line, " scantime={millis}ms");
        }
        if let Some(title) = device.title() {
            let _ = write!(line, " {title:?}");
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UrlDeviceBuilder;

    #[test]
    fn test_format_full_record() {
        let device = UrlDeviceBuilder::new("id", "https://example.org")
            .set_rssi(-70)
            .unwrap()
            .set_tx_power(-20)
            .unwrap()
            .set_scan_time_millis(42)
            .unwrap()
            .set_title("Lobby")
            .unwrap()
            .build();

        assert_eq!(
            TextFormatter.format(&device).unwrap(),
            r#"https://example.org rssi=-70 tx=-20 scantime=42ms "Lobby""#
        );
    }

    #[test]
    fn test_format_url_only() {
        let device = UrlDeviceBuilder::new("id", "http://www.goo.com").build();
        assert_eq!(TextFormatter.format(&device).unwrap(), "http://www.goo.com");
    }
}
