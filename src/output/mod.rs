//! Output formatters for discovered devices.
//!
//! Each discovered device becomes one line of output. JSON lines carry the
//! complete record; the text format is meant for watching a scan in a
//! terminal.

pub mod json;
pub mod text;

use crate::device::DiscoveredDevice;

/// Trait for formatting discovered devices into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a device as a single line, without the trailing newline.
    fn format(&self, device: &DiscoveredDevice) -> Result<String, serde_json::Error>;
}

/// Output formats selectable on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable summary per line
    Text,
}

impl OutputFormat {
    pub fn formatter(self) -> Box<dyn OutputFormatter> {
        match self {
            OutputFormat::Json => Box::new(json::JsonFormatter),
            OutputFormat::Text => Box::new(text::TextFormatter),
        }
    }
}
