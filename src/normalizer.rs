use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Latest normalized snapshot for one device.
///
/// Wire names match the device schema exactly (the dashboard consumes them
/// as-is), so several fields carry explicit renames. Absent fields serialize
/// as `null` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "devId")]
    pub device_id: String,
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,
    /// Device-supplied timestamp, passed through verbatim and never parsed.
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

impl Reading {
    /// A reading carrying only identity and arrival time, every measurement
    /// absent. Useful as a base when building readings field by field.
    pub fn bare(device_id: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            received_at,
            timestamp_reported: None,
            temp: None,
            hum: None,
            pressure: None,
            lat: None,
            lng: None,
            rssi: None,
            pm2d5: None,
            pm10: None,
            aqi: None,
            pm25_aqi: None,
            pm10_aqi: None,
            fw_v: None,
            t_tot: None,
            v_tot: None,
            volume: None,
            totalizer: None,
            ms: None,
            us: None,
            pc: None,
        }
    }
}

/// Whole-payload discard decision. Callers log it and move on; a bad payload
/// is never fatal.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload has no data array")]
    MissingDataList,
}

/// Parse one raw feed payload into per-device readings.
///
/// The payload must be a JSON object with a `data` array of per-device
/// entries. Entries without a usable device identifier are skipped
/// individually; the rest of the batch still goes through.
#[instrument(skip(raw), fields(payload_bytes = raw.len()))]
pub fn normalize_payload(raw: &[u8]) -> Result<Vec<Reading>, NormalizeError> {
    let payload: Value = serde_json::from_slice(raw)?;
    let entries = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingDataList)?;

    let mut readings = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        match normalize_entry(entry) {
            Some(reading) => readings.push(reading),
            None => {
                debug!("Skipping entry without a device identifier");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} of {} entries with a missing or empty device identifier",
            skipped,
            entries.len()
        );
    }
    debug!("Normalized {} readings from {} entries", readings.len(), entries.len());

    Ok(readings)
}

fn normalize_entry(entry: &Value) -> Option<Reading> {
    let device_id = entry
        .get("devId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())?
        .to_string();

    Some(Reading {
        device_id,
        received_at: Utc::now(),
        timestamp_reported: passthrough_field(entry, "ts"),
        temp: numeric_field(entry, "temp"),
        hum: numeric_field(entry, "hum"),
        pressure: numeric_field(entry, "pressure"),
        lat: numeric_field(entry, "lat"),
        lng: numeric_field(entry, "lng"),
        rssi: passthrough_field(entry, "rssi"),
        pm2d5: numeric_field(entry, "pm2d5"),
        pm10: numeric_field(entry, "pm10"),
        aqi: integer_field(entry, "aqi"),
        pm25_aqi: passthrough_field(entry, "pm25_aqi"),
        pm10_aqi: passthrough_field(entry, "pm10_aqi"),
        fw_v: passthrough_field(entry, "fw_v"),
        t_tot: passthrough_field(entry, "T_Tot"),
        v_tot: passthrough_field(entry, "V_Tot"),
        volume: passthrough_field(entry, "Volume"),
        totalizer: passthrough_field(entry, "Totalizer"),
        ms: passthrough_field(entry, "ms"),
        us: passthrough_field(entry, "us"),
        pc: passthrough_field(entry, "PC"),
    })
}

/// Single conversion rule for all numeric fields: a number or numeric string
/// converts, anything else (missing, null, junk, non-finite) is absent.
/// A genuine zero stays zero; it is a value, not absence.
fn numeric_field(entry: &Value, key: &str) -> Option<f64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Integer fields truncate toward zero from any numeric form.
fn integer_field(entry: &Value, key: &str) -> Option<i64> {
    numeric_field(entry, key).map(|v| v.trunc() as i64)
}

/// Passthrough fields keep their raw JSON value; explicit nulls become absent.
fn passthrough_field(entry: &Value, key: &str) -> Option<Value> {
    entry.get(key).filter(|v| !v.is_null()).cloned()
}
