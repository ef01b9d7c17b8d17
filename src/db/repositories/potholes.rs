use crate::db::models::{MapPoint, NewPothole, ReportEntry};
use crate::error::Error;
use anyhow::Result;
use log::debug;
use sqlx::SqlitePool;
use std::sync::Arc;

const INSERT_POTHOLE: &str = r#"
    INSERT INTO potholes (latitude, longitude, severity, confidence, depth, timestamp)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

/// Append-only store of detected potholes
#[derive(Clone)]
pub struct PotholesRepository {
    pool: Arc<SqlitePool>,
}

impl PotholesRepository {
    /// Create a new potholes repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert a single pothole and return its id
    pub async fn insert(&self, pothole: &NewPothole) -> Result<i64> {
        let result = sqlx::query(INSERT_POTHOLE)
            .bind(pothole.latitude)
            .bind(pothole.longitude)
            .bind(pothole.severity)
            .bind(pothole.confidence)
            .bind(pothole.depth)
            .bind(pothole.timestamp)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to insert pothole: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// Insert every pothole of one detect request in a single transaction.
    /// Nothing from the batch is visible unless all rows were written.
    pub async fn insert_batch(&self, potholes: &[NewPothole]) -> Result<Vec<i64>> {
        if potholes.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to begin transaction: {}", e)))?;

        let mut ids = Vec::with_capacity(potholes.len());
        for pothole in potholes {
            let result = sqlx::query(INSERT_POTHOLE)
                .bind(pothole.latitude)
                .bind(pothole.longitude)
                .bind(pothole.severity)
                .bind(pothole.confidence)
                .bind(pothole.depth)
                .bind(pothole.timestamp)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::StorageUnavailable(format!("Failed to insert pothole: {}", e)))?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to commit potholes: {}", e)))?;

        debug!("Stored {} potholes", ids.len());
        Ok(ids)
    }

    /// Marker data for the map view
    pub async fn list_for_map(&self) -> Result<Vec<MapPoint>> {
        let result = sqlx::query_as::<_, MapPoint>(
            r#"
            SELECT latitude AS lat, longitude AS lon, severity
            FROM potholes
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("Failed to list potholes for map: {}", e)))?;

        Ok(result)
    }

    /// Every stored pothole, for the complaint report
    pub async fn list_all(&self) -> Result<Vec<ReportEntry>> {
        let result = sqlx::query_as::<_, ReportEntry>(
            r#"
            SELECT latitude AS lat, longitude AS lon, severity, confidence, timestamp AS time
            FROM potholes
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("Failed to list potholes: {}", e)))?;

        Ok(result)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM potholes")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to count potholes: {}", e)))?;

        Ok(count)
    }
}
