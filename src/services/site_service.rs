use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::db::{AddressRecord, AddressRepository, DbError, Site, SiteRepository, SiteUpsert};
use crate::normalizer::Reading;
use crate::state::DeviceStateStore;

/// Location marker when neither device resolves and the site has no
/// fallback text.
const LOCATION_UNAVAILABLE: &str = "unavailable";

// Admin upsert request (shared by the API handler and the seeding tool)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpsertRequest {
    pub site_id: Option<String>,
    pub name: Option<String>,
    pub client_label: Option<String>,
    pub inlet_device_id: Option<String>,
    pub outlet_device_id: Option<String>,
    pub fallback_location_text: Option<String>,
}

impl SiteUpsertRequest {
    /// Check the required identifiers, returning the wire names of every
    /// missing or blank one.
    pub fn validate(self) -> Result<SiteUpsert, Vec<&'static str>> {
        let site_id = non_blank(self.site_id.as_deref());
        let inlet_device_id = non_blank(self.inlet_device_id.as_deref());
        let outlet_device_id = non_blank(self.outlet_device_id.as_deref());

        let mut missing = Vec::new();
        if site_id.is_none() {
            missing.push("siteId");
        }
        if inlet_device_id.is_none() {
            missing.push("inletDeviceId");
        }
        if outlet_device_id.is_none() {
            missing.push("outletDeviceId");
        }

        match (site_id, inlet_device_id, outlet_device_id) {
            (Some(site_id), Some(inlet_device_id), Some(outlet_device_id)) => Ok(SiteUpsert {
                site_id,
                name: self.name,
                client_label: self.client_label,
                inlet_device_id,
                outlet_device_id,
                fallback_location_text: self.fallback_location_text,
            }),
            _ => Err(missing),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Sensor values for one side of a site. Deliberately carries no device
/// identifier; dashboard clients get measurements, not hardware addresses.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,
    #[serde(rename = "ts")]
    pub timestamp_reported: Option<Value>,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub pressure: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub rssi: Option<Value>,
    pub pm2d5: Option<f64>,
    pub pm10: Option<f64>,
    pub aqi: Option<i64>,
    pub pm25_aqi: Option<Value>,
    pub pm10_aqi: Option<Value>,
    pub fw_v: Option<Value>,
    #[serde(rename = "T_Tot")]
    pub t_tot: Option<Value>,
    #[serde(rename = "V_Tot")]
    pub v_tot: Option<Value>,
    #[serde(rename = "Volume")]
    pub volume: Option<Value>,
    #[serde(rename = "Totalizer")]
    pub totalizer: Option<Value>,
    pub ms: Option<Value>,
    pub us: Option<Value>,
    #[serde(rename = "PC")]
    pub pc: Option<Value>,
}

impl SensorSnapshot {
    fn from_reading(reading: &Reading) -> Self {
        Self {
            received_at: reading.received_at,
            timestamp_reported: reading.timestamp_reported.clone(),
            temp: reading.temp,
            hum: reading.hum,
            pressure: reading.pressure,
            lat: reading.lat,
            lng: reading.lng,
            rssi: reading.rssi.clone(),
            pm2d5: reading.pm2d5,
            pm10: reading.pm10,
            aqi: reading.aqi,
            pm25_aqi: reading.pm25_aqi.clone(),
            pm10_aqi: reading.pm10_aqi.clone(),
            fw_v: reading.fw_v.clone(),
            t_tot: reading.t_tot.clone(),
            v_tot: reading.v_tot.clone(),
            volume: reading.volume.clone(),
            totalizer: reading.totalizer.clone(),
            ms: reading.ms.clone(),
            us: reading.us.clone(),
            pc: reading.pc.clone(),
        }
    }
}

/// One site's aggregated state, recomputed on every read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub site_id: String,
    pub name: Option<String>,
    pub client_label: Option<String>,
    pub location: String,
    pub is_online: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub inlet: Option<SensorSnapshot>,
    pub outlet: Option<SensorSnapshot>,
    pub pm2d5_reduction_pct: Option<f64>,
    pub pm10_reduction_pct: Option<f64>,
}

#[derive(Clone)]
pub struct SiteService {
    site_repo: SiteRepository,
    address_repo: AddressRepository,
    device_store: Arc<DeviceStateStore>,
}

impl SiteService {
    pub fn new(
        site_repo: SiteRepository,
        address_repo: AddressRepository,
        device_store: Arc<DeviceStateStore>,
    ) -> Self {
        Self {
            site_repo,
            address_repo,
            device_store,
        }
    }

    /// Views for every site against the current device snapshot. Offline
    /// sites are dropped unless `include_offline` is set.
    #[instrument(skip(self))]
    pub async fn aggregated_views(&self, include_offline: bool) -> Result<Vec<SiteView>, DbError> {
        let sites = self.site_repo.find_all().await?;
        let device_states = self.device_store.snapshot().await;
        let addresses: HashMap<String, AddressRecord> = self
            .address_repo
            .find_all()
            .await?
            .into_iter()
            .map(|record| (record.device_id.clone(), record))
            .collect();

        let mut views = build_views(&sites, &device_states, &addresses);
        if !include_offline {
            views.retain(|view| view.is_online);
        }
        Ok(views)
    }

    #[instrument(skip(self, site), fields(site_id = %site.site_id))]
    pub async fn upsert_site(&self, site: &SiteUpsert) -> Result<Site, DbError> {
        self.site_repo.upsert(site).await
    }
}

/// Assemble a view per site from a device snapshot and the address cache.
/// Pure function of its inputs; offline filtering is the caller's concern,
/// so every site always yields a record here.
pub fn build_views(
    sites: &[Site],
    device_states: &HashMap<String, Reading>,
    addresses: &HashMap<String, AddressRecord>,
) -> Vec<SiteView> {
    sites
        .iter()
        .map(|site| build_view(site, device_states, addresses))
        .collect()
}

fn build_view(
    site: &Site,
    device_states: &HashMap<String, Reading>,
    addresses: &HashMap<String, AddressRecord>,
) -> SiteView {
    let inlet = device_states.get(&site.inlet_device_id);
    let outlet = device_states.get(&site.outlet_device_id);

    let is_online = inlet.is_some() || outlet.is_some();
    let last_update = [inlet, outlet]
        .into_iter()
        .flatten()
        .map(|reading| reading.received_at)
        .max();

    SiteView {
        site_id: site.site_id.clone(),
        name: site.name.clone(),
        client_label: site.client_label.clone(),
        location: resolve_location(site, inlet, outlet, addresses),
        is_online,
        last_update,
        inlet: inlet.map(SensorSnapshot::from_reading),
        outlet: outlet.map(SensorSnapshot::from_reading),
        pm2d5_reduction_pct: reduction(inlet, outlet, |r| r.pm2d5),
        pm10_reduction_pct: reduction(inlet, outlet, |r| r.pm10),
    }
}

/// Inlet address first, then outlet, then the site's fallback text, then a
/// literal marker. Both sensors normally share one physical location;
/// inlet-priority is the tie-break.
fn resolve_location(
    site: &Site,
    inlet: Option<&Reading>,
    outlet: Option<&Reading>,
    addresses: &HashMap<String, AddressRecord>,
) -> String {
    if let Some(address) = located_address(&site.inlet_device_id, inlet, addresses) {
        return address;
    }
    if let Some(address) = located_address(&site.outlet_device_id, outlet, addresses) {
        return address;
    }
    site.fallback_location_text
        .clone()
        .unwrap_or_else(|| LOCATION_UNAVAILABLE.to_string())
}

/// A device contributes its cached address only while its current reading
/// carries a real fix (coordinates present and non-zero).
fn located_address(
    device_id: &str,
    reading: Option<&Reading>,
    addresses: &HashMap<String, AddressRecord>,
) -> Option<String> {
    let reading = reading?;
    let lat = reading.lat?;
    let lng = reading.lng?;
    if lat == 0.0 || lng == 0.0 {
        return None;
    }
    addresses
        .get(device_id)
        .map(|record| record.address_text.clone())
}

/// Percentage reduction from inlet to outlet, clamped at zero. Needs both
/// readings, a present non-zero inlet value, and a present outlet value.
/// An outlet value of zero is a genuine 100%, not absence.
fn reduction(
    inlet: Option<&Reading>,
    outlet: Option<&Reading>,
    field: impl Fn(&Reading) -> Option<f64>,
) -> Option<f64> {
    let inlet_value = field(inlet?)?;
    let outlet_value = field(outlet?)?;
    if inlet_value == 0.0 {
        return None;
    }
    Some(((inlet_value - outlet_value) / inlet_value * 100.0).max(0.0))
}
