use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::db::{DbError, Site, SiteUpsert};

#[derive(Clone)]
pub struct SiteRepository {
    pool: SqlitePool,
}

impl SiteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a site by `site_id`, returning the stored row.
    /// `created_at` is preserved across updates; `updated_at` always moves.
    #[instrument(skip(self, site), fields(site_id = %site.site_id))]
    pub async fn upsert(&self, site: &SiteUpsert) -> Result<Site, DbError> {
        let now = Utc::now();

        let stored = sqlx::query_as::<_, Site>(
            r#"
            INSERT INTO sites (site_id, name, client_label, inlet_device_id,
                               outlet_device_id, fallback_location_text,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(site_id) DO UPDATE SET
                name = excluded.name,
                client_label = excluded.client_label,
                inlet_device_id = excluded.inlet_device_id,
                outlet_device_id = excluded.outlet_device_id,
                fallback_location_text = excluded.fallback_location_text,
                updated_at = excluded.updated_at
            RETURNING site_id, name, client_label, inlet_device_id,
                      outlet_device_id, fallback_location_text,
                      created_at, updated_at
            "#,
        )
        .bind(&site.site_id)
        .bind(&site.name)
        .bind(&site.client_label)
        .bind(&site.inlet_device_id)
        .bind(&site.outlet_device_id)
        .bind(&site.fallback_location_text)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!("Upserted site {}", stored.site_id);
        Ok(stored)
    }

    /// All sites, ordered by `site_id` for stable output.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Site>, DbError> {
        let sites = sqlx::query_as::<_, Site>(
            r#"
            SELECT site_id, name, client_label, inlet_device_id,
                   outlet_device_id, fallback_location_text,
                   created_at, updated_at
            FROM sites
            ORDER BY site_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} sites", sites.len());
        Ok(sites)
    }

    #[instrument(skip(self), fields(site_id = %site_id))]
    pub async fn find_by_id(&self, site_id: &str) -> Result<Option<Site>, DbError> {
        let site = sqlx::query_as::<_, Site>(
            r#"
            SELECT site_id, name, client_label, inlet_device_id,
                   outlet_device_id, fallback_location_text,
                   created_at, updated_at
            FROM sites
            WHERE site_id = ?
            "#,
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(site)
    }
}
