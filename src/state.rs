//! In-memory latest-per-device store.
//!
//! Entries live in a fixed number of shards, each an independently locked
//! map, so writes for different devices do not contend and readers take only
//! brief per-shard read locks. Locks are never held across an `await` point.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::normalizer::Reading;

const SHARD_COUNT: usize = 16;

/// Stable partition index for a device identifier.
///
/// Shared by the store's shard selection and the resolver channel routing so
/// everything that must stay ordered per device hashes the same way.
pub fn partition_for(device_id: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    (hasher.finish() as usize) % partitions
}

/// Most recent reading per device, with TTL-based staleness.
///
/// A reading older than the TTL is treated as absent by every read path,
/// modeling "device presumed offline"; `prune_expired` physically removes
/// such entries to bound memory.
pub struct DeviceStateStore {
    shards: Vec<RwLock<HashMap<String, Reading>>>,
    ttl: Duration,
}

impl DeviceStateStore {
    pub fn new(ttl_secs: u64) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Store a reading, unconditionally replacing any prior entry for the
    /// same device. Last-write-wins by arrival order; device-reported
    /// timestamps play no part.
    pub async fn put(&self, reading: Reading) {
        let shard = self.shard_for(&reading.device_id);
        let mut map = shard.write().await;
        map.insert(reading.device_id.clone(), reading);
    }

    /// The current reading for one device, or `None` if unknown or expired.
    pub async fn get(&self, device_id: &str) -> Option<Reading> {
        let now = Utc::now();
        let map = self.shard_for(device_id).read().await;
        map.get(device_id)
            .filter(|reading| !self.is_expired(reading, now))
            .cloned()
    }

    /// A point-in-time copy of all unexpired readings keyed by device.
    pub async fn snapshot(&self) -> HashMap<String, Reading> {
        let now = Utc::now();
        let mut all = HashMap::new();
        for shard in &self.shards {
            let map = shard.read().await;
            for (device_id, reading) in map.iter() {
                if !self.is_expired(reading, now) {
                    all.insert(device_id.clone(), reading.clone());
                }
            }
        }
        all
    }

    /// Number of devices with an unexpired reading.
    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for shard in &self.shards {
            let map = shard.read().await;
            count += map
                .values()
                .filter(|reading| !self.is_expired(reading, now))
                .count();
        }
        count
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut map = shard.write().await;
            let before = map.len();
            map.retain(|_, reading| !self.is_expired(reading, now));
            removed += before - map.len();
        }
        if removed > 0 {
            debug!("Pruned {} expired device entries", removed);
        }
        removed
    }

    fn is_expired(&self, reading: &Reading, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(reading.received_at) > self.ttl
    }

    fn shard_for(&self, device_id: &str) -> &RwLock<HashMap<String, Reading>> {
        &self.shards[partition_for(device_id, self.shards.len())]
    }
}
