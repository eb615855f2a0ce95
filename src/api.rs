use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};

use crate::db;
use crate::feed::FeedStatus;
use crate::normalizer::Reading;
use crate::services::{SiteService, SiteUpsertRequest, SiteView};
use crate::state::DeviceStateStore;

#[derive(Clone)]
pub struct AppState {
    pub device_store: Arc<DeviceStateStore>,
    pub site_service: SiteService,
    pub pool: SqlitePool,
    pub feed_status: FeedStatus,
    pub started_at: Instant,
}

/// Error responses carry the same `success` envelope as data responses.
/// Internal details stay in the logs.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesResponse {
    pub success: bool,
    pub total_devices: usize,
    pub server_time: DateTime<Utc>,
    pub data: Vec<Reading>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitesResponse {
    pub success: bool,
    pub generated_at: DateTime<Utc>,
    pub total_sites: usize,
    pub sites: Vec<SiteView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub feed_connected: bool,
    pub store_connected: bool,
    pub active_devices: usize,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpsertResponse {
    pub success: bool,
    pub site_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SitesQuery {
    #[serde(default)]
    pub include_offline: bool,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/devices/latest", get(get_latest_devices))
        .route("/sites", get(get_sites).post(upsert_site))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");

    let store_connected = db::ping(&state.pool).await.is_ok();
    if !store_connected {
        warn!("Health check found the site store unreachable");
    }

    let response = HealthResponse {
        status: "running".to_string(),
        feed_connected: state.feed_status.is_connected(),
        store_connected,
        active_devices: state.device_store.active_count().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn get_latest_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    debug!("Fetching latest snapshots for all devices");

    let snapshot = state.device_store.snapshot().await;
    let mut data: Vec<Reading> = snapshot.into_values().collect();
    data.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    info!("Returning snapshots for {} devices", data.len());

    Json(DevicesResponse {
        success: true,
        total_devices: data.len(),
        server_time: Utc::now(),
        data,
    })
}

#[instrument(skip(state), fields(include_offline = %params.include_offline))]
async fn get_sites(
    State(state): State<AppState>,
    Query(params): Query<SitesQuery>,
) -> Result<Json<SitesResponse>, ApiError> {
    debug!("Aggregating site views");

    let sites = state
        .site_service
        .aggregated_views(params.include_offline)
        .await
        .map_err(|e| {
            error!("Failed to aggregate site views: {}", e);
            ApiError::internal()
        })?;

    info!("Aggregated {} site views", sites.len());

    Ok(Json(SitesResponse {
        success: true,
        generated_at: Utc::now(),
        total_sites: sites.len(),
        sites,
    }))
}

#[instrument(skip(state, request))]
async fn upsert_site(
    State(state): State<AppState>,
    Json(request): Json<SiteUpsertRequest>,
) -> Result<Json<SiteUpsertResponse>, ApiError> {
    let upsert = request.validate().map_err(|missing| {
        warn!(
            "Rejecting site upsert with missing fields: {}",
            missing.join(", ")
        );
        ApiError::bad_request(format!("missing required fields: {}", missing.join(", ")))
    })?;

    debug!("Upserting site {}", upsert.site_id);

    let site = state.site_service.upsert_site(&upsert).await.map_err(|e| {
        error!("Failed to upsert site {}: {}", upsert.site_id, e);
        ApiError::internal()
    })?;

    info!("Upserted site {}", site.site_id);

    Ok(Json(SiteUpsertResponse {
        success: true,
        site_id: site.site_id,
    }))
}
