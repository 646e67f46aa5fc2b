//! Human-readable titles for known beacons.
//!
//! `--title AA:BB:CC:DD:EE:FF=Lobby` attaches a `title` extra to every record
//! discovered from that hardware address.

use std::collections::BTreeMap;
use thiserror::Error;

/// Hardware address (uppercase) to title.
pub type LabelMap = BTreeMap<String, String>;

/// A parsed `ADDRESS=TITLE` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub address: String,
    pub title: String,
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseLabelError {
    #[error("invalid label: expected format ADDRESS=TITLE")]
    MissingSeparator,
    #[error("invalid label: address is empty")]
    EmptyAddress,
}

/// Parse a label from `ADDRESS=TITLE`.
///
/// # Example
/// ```
/// use eddystone_listener::label::parse_label;
///
/// let label = parse_label("aa:bb:cc:dd:ee:ff=Front door").unwrap();
/// assert_eq!(label.address, "AA:BB:CC:DD:EE:FF");
/// assert_eq!(label.title, "Front door");
/// ```
pub fn parse_label(src: &str) -> Result<Label, ParseLabelError> {
    let (address, title) = src
        .split_once('=')
        .ok_or(ParseLabelError::MissingSeparator)?;
    let address = address.trim();
    if address.is_empty() {
        return Err(ParseLabelError::EmptyAddress);
    }

    Ok(Label {
        address: address.to_uppercase(),
        title: title.to_string(),
    })
}

/// Collect labels into a lookup map. Later labels for the same address win.
pub fn to_map(labels: &[Label]) -> LabelMap {
    labels
        .iter()
        .map(|l| (l.address.clone(), l.title.clone()))
        .collect()
}

/// Title for `address`, matched case-insensitively.
pub fn resolve_title<'a>(address: &str, labels: &'a LabelMap) -> Option<&'a str> {
    if labels.is_empty() {
        return None;
    }
    labels.get(&address.to_uppercase()).map(String::as_str)
}
