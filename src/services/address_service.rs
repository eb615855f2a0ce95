use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::db::{AddressRecord, AddressRepository, DbError};
use crate::geocode::{shorten_address, ReverseGeocoder};

/// What became of one resolution request.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Coordinates were the no-fix sentinel; nothing attempted.
    SkippedNoFix,
    /// The cached address still covers these coordinates.
    CacheHit,
    /// A new address was resolved and cached.
    Resolved,
    /// The upstream call failed; nothing was cached.
    Failed,
}

/// Caching policy around the reverse geocoder.
///
/// Keyed by device: a device re-resolves only when it has no cached address
/// or has moved beyond the movement threshold on either axis. Failures are
/// never cached, so the next reading from the device retries naturally.
#[derive(Clone)]
pub struct AddressService {
    geocoder: ReverseGeocoder,
    address_repo: AddressRepository,
    movement_threshold_deg: f64,
    keep_segments: usize,
}

impl AddressService {
    pub fn new(
        geocoder: ReverseGeocoder,
        address_repo: AddressRepository,
        movement_threshold_deg: f64,
        keep_segments: usize,
    ) -> Self {
        Self {
            geocoder,
            address_repo,
            movement_threshold_deg,
            keep_segments,
        }
    }

    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn resolve_if_needed(
        &self,
        device_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<ResolveOutcome, DbError> {
        // Zero on either axis is the devices' "no GPS fix" sentinel, not a
        // real location.
        if lat == 0.0 || lng == 0.0 {
            debug!("Skipping resolution for no-fix coordinates ({}, {})", lat, lng);
            return Ok(ResolveOutcome::SkippedNoFix);
        }

        if let Some(existing) = self.address_repo.find_by_device(device_id).await? {
            if !self.moved_beyond_threshold(&existing, lat, lng) {
                debug!("Address cache hit for device {}", device_id);
                return Ok(ResolveOutcome::CacheHit);
            }
            debug!(
                "Device {} moved from ({}, {}) to ({}, {}), re-resolving",
                device_id, existing.last_lat, existing.last_lng, lat, lng
            );
        }

        match self.geocoder.reverse(lat, lng).await {
            Ok(full_address) => {
                let record = AddressRecord {
                    device_id: device_id.to_string(),
                    address_text: shorten_address(&full_address, self.keep_segments),
                    last_lat: lat,
                    last_lng: lng,
                    resolved_at: Utc::now(),
                };
                self.address_repo.upsert(&record).await?;
                info!(
                    "Resolved address for device {}: {}",
                    device_id, record.address_text
                );
                Ok(ResolveOutcome::Resolved)
            }
            Err(e) => {
                warn!("Address resolution failed for device {}: {}", device_id, e);
                Ok(ResolveOutcome::Failed)
            }
        }
    }

    fn moved_beyond_threshold(&self, existing: &AddressRecord, lat: f64, lng: f64) -> bool {
        (lat - existing.last_lat).abs() > self.movement_threshold_deg
            || (lng - existing.last_lng).abs() > self.movement_threshold_deg
    }
}
