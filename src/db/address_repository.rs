use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::db::{AddressRecord, DbError};

/// Persistent reverse-geocode cache, one row per device.
#[derive(Clone)]
pub struct AddressRepository {
    pool: SqlitePool,
}

impl AddressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn find_by_device(&self, device_id: &str) -> Result<Option<AddressRecord>, DbError> {
        let record = sqlx::query_as::<_, AddressRecord>(
            r#"
            SELECT device_id, address_text, last_lat, last_lng, resolved_at
            FROM device_addresses
            WHERE device_id = ?
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// All cached addresses. The table holds one small row per device that
    /// ever resolved, so loading it whole for aggregation is fine.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<AddressRecord>, DbError> {
        let records = sqlx::query_as::<_, AddressRecord>(
            r#"
            SELECT device_id, address_text, last_lat, last_lng, resolved_at
            FROM device_addresses
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} cached addresses", records.len());
        Ok(records)
    }

    /// Store a successful resolution, replacing any prior address for the
    /// device.
    #[instrument(skip(self, record), fields(device_id = %record.device_id))]
    pub async fn upsert(&self, record: &AddressRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO device_addresses (device_id, address_text, last_lat,
                                          last_lng, resolved_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                address_text = excluded.address_text,
                last_lat = excluded.last_lat,
                last_lng = excluded.last_lng,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(&record.device_id)
        .bind(&record.address_text)
        .bind(record.last_lat)
        .bind(record.last_lng)
        .bind(record.resolved_at)
        .execute(&self.pool)
        .await?;

        debug!("Cached address for device {}", record.device_id);
        Ok(())
    }
}
