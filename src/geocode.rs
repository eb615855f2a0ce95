use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("reverse geocode request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoder returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("geocoder response has no display name")]
    MissingDisplayName,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Client for a Nominatim-style reverse-geocoding endpoint.
///
/// The base URL is injectable so tests can point it at a local mock server.
/// Every request carries the client-level timeout; a hung upstream resolves
/// to an error here, never to an unbounded wait.
#[derive(Clone)]
pub struct ReverseGeocoder {
    client: Client,
    base_url: String,
    zoom: u8,
}

impl ReverseGeocoder {
    pub fn new(base_url: String, timeout_secs: u64, zoom: u8) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                // Nominatim's usage policy rejects clients without an identifying agent
                .user_agent(concat!("purifier-telemetry-service/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            zoom,
        }
    }

    /// Resolve coordinates to the full display address string.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn reverse(&self, lat: f64, lng: f64) -> Result<String, GeocodeError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("zoom", self.zoom.to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status));
        }

        let body: ReverseResponse = response.json().await?;
        let display_name = body.display_name.ok_or(GeocodeError::MissingDisplayName)?;
        debug!("Resolved ({}, {}) to \"{}\"", lat, lng, display_name);
        Ok(display_name)
    }
}

/// Keep only the last `keep` comma-separated segments of a full address,
/// trimmed. Drops street-level noise while retaining locality through
/// country.
pub fn shorten_address(full: &str, keep: usize) -> String {
    let segments: Vec<&str> = full.split(',').map(str::trim).collect();
    let start = segments.len().saturating_sub(keep);
    segments[start..].join(", ")
}
