use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, instrument};

use crate::services::address_service::{AddressService, ResolveOutcome};

/// One geocode resolution request, handed off from the ingest path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub device_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Address resolution worker.
///
/// Drains one partition's resolution queue in the background. This is a thin
/// coordination layer; the cache and movement-threshold policy live in
/// AddressService. Requests for one device always hash to the same worker,
/// so per-device resolution order holds, and a slow upstream call delays
/// only this partition.
pub struct AddressWorker {
    requests: Receiver<ResolveRequest>,
    address_service: AddressService,
    worker_id: usize,
}

impl AddressWorker {
    pub fn new(
        requests: Receiver<ResolveRequest>,
        address_service: AddressService,
        worker_id: usize,
    ) -> Self {
        Self {
            requests,
            address_service,
            worker_id,
        }
    }

    /// Run until every sending side is gone.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run(mut self) {
        info!(worker_id = self.worker_id, "Address resolution worker started");

        while let Some(request) = self.requests.recv().await {
            match self
                .address_service
                .resolve_if_needed(&request.device_id, request.lat, request.lng)
                .await
            {
                Ok(outcome) => {
                    if outcome == ResolveOutcome::Resolved {
                        debug!(
                            worker_id = self.worker_id,
                            device_id = %request.device_id,
                            "New address cached"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        worker_id = self.worker_id,
                        device_id = %request.device_id,
                        error = %e,
                        "Address cache access failed"
                    );
                }
            }
        }

        info!(worker_id = self.worker_id, "Address resolution worker stopped");
    }
}
