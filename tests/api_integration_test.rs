// API integration tests that verify HTTP endpoints
// Tests the actual Axum router with real HTTP requests

mod common;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt; // For `.collect()`
use purifier_telemetry_service::api::{create_router, AppState};
use purifier_telemetry_service::db::{AddressRepository, SiteRepository};
use purifier_telemetry_service::feed::FeedStatus;
use purifier_telemetry_service::normalizer::Reading;
use purifier_telemetry_service::services::SiteService;
use purifier_telemetry_service::state::DeviceStateStore;
use serde_json::{json, Value};
use tower::ServiceExt; // For `oneshot`

/// Helper to create the router plus the state handles tests poke directly
async fn create_test_app() -> (axum::Router, AppState) {
    let pool = common::test_pool().await;

    let site_repo = SiteRepository::new(pool.clone());
    let address_repo = AddressRepository::new(pool.clone());
    let device_store = Arc::new(DeviceStateStore::new(600));
    let site_service = SiteService::new(site_repo, address_repo, device_store.clone());

    let state = AppState {
        device_store,
        site_service,
        pool,
        feed_status: FeedStatus::new(),
        started_at: Instant::now(),
    };

    (create_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn pm_reading(device_id: &str, pm2d5: f64, pm10: f64) -> Reading {
    let mut reading = Reading::bare(device_id, Utc::now());
    reading.pm2d5 = Some(pm2d5);
    reading.pm10 = Some(pm10);
    reading
}

#[tokio::test]
async fn test_health_endpoint_reports_flags() {
    let (app, state) = create_test_app().await;
    state.feed_status.set_connected(true);

    let response = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["feedConnected"], true);
    assert_eq!(json["storeConnected"], true);
    assert_eq!(json["activeDevices"], 0);
    assert!(json["uptimeSecs"].is_number());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_counts_active_devices() {
    let (app, state) = create_test_app().await;
    state.device_store.put(pm_reading("A", 10.0, 20.0)).await;

    let json = body_json(app.oneshot(get("/api/v1/health")).await.unwrap()).await;
    assert_eq!(json["feedConnected"], false);
    assert_eq!(json["activeDevices"], 1);
}

#[tokio::test]
async fn test_health_reports_store_disconnected_when_pool_closed() {
    let (app, state) = create_test_app().await;
    state.pool.close().await;

    // Liveness, not readiness: a failed store ping is still a 200
    let response = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["storeConnected"], false);
}

#[tokio::test]
async fn test_devices_latest_empty() {
    let (app, _state) = create_test_app().await;

    let response = app.oneshot(get("/api/v1/devices/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["totalDevices"], 0);
    assert_eq!(json["data"], json!([]));
    assert!(json["serverTime"].is_string());
}

#[tokio::test]
async fn test_devices_latest_sorted_with_device_schema_names() {
    let (app, state) = create_test_app().await;
    state.device_store.put(pm_reading("B", 12.5, 30.0)).await;
    state.device_store.put(pm_reading("A", 40.0, 55.0)).await;

    let json = body_json(app.oneshot(get("/api/v1/devices/latest")).await.unwrap()).await;
    assert_eq!(json["totalDevices"], 2);
    assert_eq!(json["data"][0]["devId"], "A");
    assert_eq!(json["data"][1]["devId"], "B");
    assert_eq!(json["data"][0]["pm2d5"], 40.0);
    assert_eq!(json["data"][1]["pm2d5"], 12.5);
    assert!(json["data"][0]["receivedAt"].is_string());
}

#[tokio::test]
async fn test_stale_devices_are_not_listed() {
    let (app, state) = create_test_app().await;
    let aged = Reading::bare("OLD", Utc::now() - Duration::seconds(700));
    state.device_store.put(aged).await;

    let json = body_json(app.oneshot(get("/api/v1/devices/latest")).await.unwrap()).await;
    assert_eq!(json["totalDevices"], 0);
}

#[tokio::test]
async fn test_upsert_site_then_sites_view_roundtrip() {
    let (app, state) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/sites",
            json!({
                "siteId": "pune-01",
                "name": "Pune Tower",
                "clientLabel": "Acme Clean Air",
                "inletDeviceId": "IN",
                "outletDeviceId": "OUT",
                "fallbackLocationText": "Plant 4, Pune"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["siteId"], "pune-01");

    state.device_store.put(pm_reading("IN", 100.0, 80.0)).await;
    state.device_store.put(pm_reading("OUT", 25.0, 60.0)).await;

    let json = body_json(app.oneshot(get("/api/v1/sites")).await.unwrap()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["totalSites"], 1);
    assert!(json["generatedAt"].is_string());

    let site = &json["sites"][0];
    assert_eq!(site["siteId"], "pune-01");
    assert_eq!(site["name"], "Pune Tower");
    assert_eq!(site["clientLabel"], "Acme Clean Air");
    assert_eq!(site["isOnline"], true);
    assert_eq!(site["location"], "Plant 4, Pune");
    assert_eq!(site["pm2d5ReductionPct"], 75.0);
    assert_eq!(site["pm10ReductionPct"], 25.0);
    assert_eq!(site["inlet"]["pm2d5"], 100.0);
    assert_eq!(site["outlet"]["pm2d5"], 25.0);

    // Device identifiers never surface in the sites view
    assert!(site["inlet"].get("devId").is_none());
    assert!(site.get("inletDeviceId").is_none());
    assert!(site.get("outletDeviceId").is_none());
}

#[tokio::test]
async fn test_upsert_site_missing_fields_names_them() {
    let (app, _state) = create_test_app().await;

    let response = app
        .oneshot(post_json("/api/v1/sites", json!({ "name": "No ids" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(
        json["message"],
        "missing required fields: siteId, inletDeviceId, outletDeviceId"
    );
}

#[tokio::test]
async fn test_upsert_site_rejects_blank_identifier() {
    let (app, _state) = create_test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/sites",
            json!({
                "siteId": "   ",
                "inletDeviceId": "IN",
                "outletDeviceId": "OUT"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "missing required fields: siteId");
}

#[tokio::test]
async fn test_sites_defaults_to_online_only() {
    let (app, state) = create_test_app().await;

    for (site_id, inlet, outlet) in [("pune-01", "IN-1", "OUT-1"), ("pune-02", "IN-2", "OUT-2")] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/sites",
                json!({
                    "siteId": site_id,
                    "inletDeviceId": inlet,
                    "outletDeviceId": outlet
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    state.device_store.put(pm_reading("IN-1", 50.0, 40.0)).await;

    let json = body_json(app.clone().oneshot(get("/api/v1/sites")).await.unwrap()).await;
    assert_eq!(json["totalSites"], 1);
    assert_eq!(json["sites"][0]["siteId"], "pune-01");

    let json = body_json(
        app.oneshot(get("/api/v1/sites?include_offline=true"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["totalSites"], 2);
    assert_eq!(json["sites"][1]["siteId"], "pune-02");
    assert_eq!(json["sites"][1]["isOnline"], false);
    assert_eq!(json["sites"][1]["location"], "unavailable");
}

#[tokio::test]
async fn test_site_goes_offline_when_readings_expire() {
    let (app, state) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/sites",
            json!({
                "siteId": "pune-01",
                "inletDeviceId": "IN",
                "outletDeviceId": "OUT"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut aged = Reading::bare("IN", Utc::now() - Duration::seconds(700));
    aged.pm2d5 = Some(10.0);
    state.device_store.put(aged).await;

    let json = body_json(app.clone().oneshot(get("/api/v1/sites")).await.unwrap()).await;
    assert_eq!(json["totalSites"], 0);

    let json = body_json(
        app.oneshot(get("/api/v1/sites?include_offline=true"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["sites"][0]["isOnline"], false);
    assert_eq!(json["sites"][0]["lastUpdate"], Value::Null);
}
