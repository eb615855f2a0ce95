use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeFilter};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::normalizer::{self, Reading};
use crate::state::{partition_for, DeviceStateStore};
use crate::workers::ResolveRequest;

const PAYLOAD_PREVIEW_CHARS: usize = 200;
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Shared feed-connection flag, read by the health endpoint.
#[derive(Clone, Default)]
pub struct FeedStatus(Arc<AtomicBool>);

impl FeedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Normalize, store, and queue enrichment for one raw feed payload.
///
/// Split from the MQTT loop so tests can drive it with raw payloads and no
/// broker. Nothing in here ever fails the caller: payload trouble is logged
/// and dropped at the smallest granularity that contains it.
#[derive(Clone)]
pub struct IngestPipeline {
    device_store: Arc<DeviceStateStore>,
    resolve_queues: Vec<Sender<ResolveRequest>>,
}

impl IngestPipeline {
    pub fn new(
        device_store: Arc<DeviceStateStore>,
        resolve_queues: Vec<Sender<ResolveRequest>>,
    ) -> Self {
        Self {
            device_store,
            resolve_queues,
        }
    }

    /// Handle one feed payload end to end.
    #[instrument(skip(self, payload), fields(topic = %topic, payload_bytes = payload.len()))]
    pub async fn handle_payload(&self, topic: &str, payload: &[u8]) {
        let readings = match normalizer::normalize_payload(payload) {
            Ok(readings) => readings,
            Err(e) => {
                warn!(
                    "Discarding payload on {}: {} (payload starts: {})",
                    topic,
                    e,
                    payload_preview(payload)
                );
                return;
            }
        };

        debug!("Ingesting {} readings from {}", readings.len(), topic);
        for reading in readings {
            self.enqueue_resolution(&reading);
            self.device_store.put(reading).await;
        }
    }

    /// Queue a geocode lookup when the reading carries both coordinates.
    /// A full queue drops the request; a later reading from the device
    /// retries, and ingestion never blocks on enrichment.
    fn enqueue_resolution(&self, reading: &Reading) {
        let (Some(lat), Some(lng)) = (reading.lat, reading.lng) else {
            return;
        };
        if self.resolve_queues.is_empty() {
            return;
        }

        let queue =
            &self.resolve_queues[partition_for(&reading.device_id, self.resolve_queues.len())];
        let request = ResolveRequest {
            device_id: reading.device_id.clone(),
            lat,
            lng,
        };

        match queue.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                debug!(
                    "Resolution queue full, dropping request for device {}",
                    request.device_id
                );
            }
            Err(TrySendError::Closed(request)) => {
                warn!(
                    "Resolution queue closed, dropping request for device {}",
                    request.device_id
                );
            }
        }
    }
}

/// MQTT consumer driving the ingest pipeline.
///
/// Subscribes with QoS 1 (the feed is at-least-once; duplicate deliveries
/// are harmless because store puts are idempotent replacements).
pub struct FeedConsumer {
    options: MqttOptions,
    topics: Vec<String>,
    pipeline: IngestPipeline,
    status: FeedStatus,
}

impl FeedConsumer {
    pub fn new(config: &Config, pipeline: IngestPipeline, status: FeedStatus) -> Self {
        let mut options = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_host.clone(),
            config.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(config.mqtt_keepalive_secs));
        options.set_clean_session(true);
        // The client's default packet cap is 10 KiB, smaller than a busy
        // multi-device batch; an over-cap publish errors the event loop and
        // the batch is lost, since clean sessions get no redelivery.
        options.set_max_packet_size(config.mqtt_max_packet_bytes, config.mqtt_max_packet_bytes);
        if let (Some(username), Some(password)) = (&config.mqtt_username, &config.mqtt_password) {
            options.set_credentials(username.clone(), password.clone());
        }

        Self {
            options,
            topics: config.mqtt_topics.clone(),
            pipeline,
            status,
        }
    }

    /// Poll the event loop forever. Connection losses mark the feed down and
    /// back off before the next poll; payload trouble never ends the loop.
    #[instrument(skip(self), fields(topics = ?self.topics))]
    pub async fn run(self) {
        let (client, mut event_loop) = AsyncClient::new(self.options.clone(), 64);
        let mut reconnect_delays = reconnect_schedule();

        info!("Feed consumer started for topics {:?}", self.topics);

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to feed broker");
                    self.status.set_connected(true);
                    reconnect_delays = reconnect_schedule();
                    // Clean sessions lose subscriptions, so re-subscribe on
                    // every connect acknowledgment.
                    self.subscribe(&client).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pipeline
                        .handle_payload(&publish.topic, &publish.payload)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    self.status.set_connected(false);
                    let delay = reconnect_delays.next().unwrap_or(RECONNECT_MAX_DELAY);
                    warn!("Feed connection error: {}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn subscribe(&self, client: &AsyncClient) {
        let filters: Vec<SubscribeFilter> = self
            .topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce))
            .collect();

        if let Err(e) = client.subscribe_many(filters).await {
            warn!("Failed to subscribe to feed topics: {}", e);
        }
    }
}

fn reconnect_schedule() -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(RECONNECT_MAX_DELAY)
        .with_jitter()
        .without_max_times()
        .build()
}

/// First part of a raw payload for log context, lossily decoded.
fn payload_preview(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .take(PAYLOAD_PREVIEW_CHARS)
        .collect()
}
