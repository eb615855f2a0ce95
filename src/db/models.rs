use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

// Database entity models

/// One purification unit: a logical pairing of an inlet and an outlet sensor.
/// The device references are by value only; the devices themselves may or may
/// not currently be reporting.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Site {
    pub site_id: String,
    pub name: Option<String>,
    pub client_label: Option<String>,
    pub inlet_device_id: String,
    pub outlet_device_id: String,
    pub fallback_location_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached reverse-geocode result for one device. Only successful resolutions
/// are stored, so `address_text` is always present.
#[derive(Debug, Clone, FromRow)]
pub struct AddressRecord {
    pub device_id: String,
    pub address_text: String,
    pub last_lat: f64,
    pub last_lng: f64,
    pub resolved_at: DateTime<Utc>,
}

/// Validated input for creating or updating a site. Storage timestamps are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct SiteUpsert {
    pub site_id: String,
    pub name: Option<String>,
    pub client_label: Option<String>,
    pub inlet_device_id: String,
    pub outlet_device_id: String,
    pub fallback_location_text: Option<String>,
}
