//! Per-device rate limiting of discovered device records.
//!
//! Beacons advertise several times a second while the URL they carry rarely
//! changes. A [`Throttle`] lets through at most one record per device id per
//! interval.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Rate limiter keyed by device id.
///
/// The first record for an id is always allowed. A blocked record does not
/// restart the interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emitted: HashMap<String, Instant>,
}

impl Throttle {
    /// ```
    /// use std::time::Duration;
    /// use eddystone_listener::throttle::Throttle;
    ///
    /// let mut throttle = Throttle::new(Duration::from_secs(3));
    /// assert!(throttle.should_emit("ble-url:AA:BB:CC:DD:EE:FF:https://example.org"));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns `true` and restarts the interval if `id` may emit now.
    pub fn should_emit(&mut self, id: &str) -> bool {
        self.should_emit_at(id, Instant::now())
    }

    fn should_emit_at(&mut self, id: &str, now: Instant) -> bool {
        if let Some(last) = self.last_emitted.get_mut(id) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
            *last = now;
            return true;
        }
        self.last_emitted.insert(id.to_string(), now);
        true
    }
}

const DURATION_UNITS: [(&str, u64); 4] = [("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse a duration such as `3s`, `1m`, `500ms` or `2h`. A bare number is seconds.
///
/// ```
/// use eddystone_listener::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, millis_per_unit) = DURATION_UNITS
        .iter()
        .find_map(|(suffix, factor)| src.strip_suffix(suffix).map(|n| (n.trim(), *factor)))
        .unwrap_or((src, 1_000));

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {src}"))
}
