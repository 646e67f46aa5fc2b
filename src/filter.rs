//! Service UUID filtering for parsed advertisements.

use crate::advertisement::AdvertisementFrame;
use crate::eddystone::{EDDYSTONE_URL_SERVICE_UUID, URIBEACON_SERVICE_UUID};
use uuid::Uuid;

/// Service UUIDs that identify URL beacons.
pub const URL_BEACON_SERVICE_UUIDS: [Uuid; 2] =
    [EDDYSTONE_URL_SERVICE_UUID, URIBEACON_SERVICE_UUID];

/// Returns `true` if `frame` advertises any UUID in `interest`.
///
/// An empty interest set matches every frame.
pub fn matches(frame: &AdvertisementFrame, interest: &[Uuid]) -> bool {
    interest.is_empty() || interest.iter().any(|uuid| frame.has_service_uuid(uuid))
}
