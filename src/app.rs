use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::db::{AddressRepository, SiteRepository};
use crate::feed::{FeedConsumer, FeedStatus, IngestPipeline};
use crate::geocode::ReverseGeocoder;
use crate::scheduler;
use crate::services::{AddressService, SiteService};
use crate::state::DeviceStateStore;
use crate::workers::AddressWorker;

/// Application with all spawned background tasks and server
///
/// This struct holds handles to all running tasks, allowing graceful
/// shutdown if needed. For now, tasks run indefinitely.
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub feed_handle: JoinHandle<()>,
    pub prune_scheduler_handle: JoinHandle<()>,
    pub resolver_worker_handles: Vec<JoinHandle<()>>,
}

impl Application {
    /// Build and initialize the application
    ///
    /// This creates all repositories, services, and the device store, and
    /// spawns:
    /// - HTTP API server (Axum)
    /// - MQTT feed consumer
    /// - Address resolution workers (configurable count, default 4)
    /// - Device state prune scheduler
    pub async fn build(
        config: Config,
        pool: SqlitePool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        // Create repositories
        let site_repo = SiteRepository::new(pool.clone());
        let address_repo = AddressRepository::new(pool.clone());

        // Create shared state and services
        let device_store = Arc::new(DeviceStateStore::new(config.device_ttl_secs));
        let feed_status = FeedStatus::new();
        let geocoder = ReverseGeocoder::new(
            config.geocode_base_url.clone(),
            config.geocode_timeout_secs,
            config.geocode_zoom,
        );
        let address_service = AddressService::new(
            geocoder,
            address_repo.clone(),
            config.movement_threshold_deg,
            config.address_keep_segments,
        );
        let site_service =
            SiteService::new(site_repo.clone(), address_repo.clone(), device_store.clone());

        // Workers: address resolution, one bounded queue per worker so every
        // reading from a given device lands on the same worker
        info!(
            "Spawning {} address resolution workers",
            config.resolver_workers
        );
        let mut resolve_queues = Vec::with_capacity(config.resolver_workers);
        let mut resolver_worker_handles = Vec::with_capacity(config.resolver_workers);
        for worker_id in 0..config.resolver_workers {
            let (tx, rx) = mpsc::channel(config.resolver_queue_capacity);
            resolve_queues.push(tx);

            let worker = AddressWorker::new(rx, address_service.clone(), worker_id);
            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            resolver_worker_handles.push(handle);
        }

        // Feed consumer: MQTT ingest into the device store
        let feed_handle = {
            let pipeline = IngestPipeline::new(device_store.clone(), resolve_queues);
            let consumer = FeedConsumer::new(&config, pipeline, feed_status.clone());

            tokio::spawn(async move {
                consumer.run().await;
            })
        };

        // Scheduler: periodic prune of expired device state
        let prune_scheduler_handle = {
            let store_clone = device_store.clone();
            let prune_interval = config.prune_interval_secs;

            tokio::spawn(async move {
                scheduler::start_prune_scheduler(store_clone, prune_interval).await;
            })
        };

        // Create API router
        let app_state = AppState {
            device_store,
            site_service,
            pool,
            feed_status,
            started_at: Instant::now(),
        };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        // Spawn server
        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self {
            server_handle,
            feed_handle,
            prune_scheduler_handle,
            resolver_worker_handles,
        })
    }

    /// Run until the server stops (which runs indefinitely unless error)
    ///
    /// The feed consumer, resolution workers, and scheduler also run
    /// indefinitely in the background.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
