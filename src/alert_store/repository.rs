//! AlertStore Repository
//!
//! MySQL persistence for alerts

use super::types::*;
use super::{tally, validate_resolution, AlertRepository};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

const SCHEMA: &str = include_str!("../../migrations/001_alerts.sql");

/// Alert repository backed by MySQL
pub struct MySqlAlertRepository {
    pool: MySqlPool,
}

impl MySqlAlertRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Create the alerts table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for MySqlAlertRepository {
    async fn create_alert(&self, alert: &NewAlert) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts
                (camera_id, message, missing, level, image_ref, created_at, resolved, resolution_status)
            VALUES
                (?, ?, ?, ?, ?, ?, FALSE, 'pending')
            "#,
        )
        .bind(&alert.camera_id)
        .bind(&alert.message)
        .bind(&alert.missing)
        .bind(alert.level.as_str())
        .bind(&alert.image_ref)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn get_alert(&self, id: u64) -> Result<Option<AlertRecord>> {
        let row = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT
                id, camera_id, message, missing, level, image_ref, created_at,
                resolved, resolution_status, resolution_notes, resolved_by, resolved_at
            FROM alerts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<AlertRecord>> {
        // NULL parameters disable their filter
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT
                id, camera_id, message, missing, level, image_ref, created_at,
                resolved, resolution_status, resolution_notes, resolved_by, resolved_at
            FROM alerts
            WHERE (? IS NULL OR created_at >= ?)
              AND (? = FALSE OR resolved = FALSE)
              AND (? IS NULL OR camera_id = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(query.since)
        .bind(query.since)
        .bind(query.unresolved_only)
        .bind(&query.camera_id)
        .bind(&query.camera_id)
        .bind(query.limit.map(|l| l as u64).unwrap_or(u64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn resolve_alert(&self, id: u64, resolution: &AlertResolution) -> Result<AlertRecord> {
        validate_resolution(resolution)?;

        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                resolved = TRUE,
                resolution_status = ?,
                resolution_notes = ?,
                resolved_by = ?,
                resolved_at = ?,
                level = COALESCE(?, level)
            WHERE id = ?
            "#,
        )
        .bind(resolution.status.as_str())
        .bind(&resolution.notes)
        .bind(&resolution.resolved_by)
        .bind(Utc::now())
        .bind(resolution.level.map(|l| l.as_str()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("alert {}", id)));
        }

        self.get_alert(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("alert {}", id)))
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<AlertStatistics> {
        let rows: Vec<(bool, String, i64)> = sqlx::query_as(
            r#"
            SELECT resolved, resolution_status, COUNT(*)
            FROM alerts
            WHERE created_at >= ?
            GROUP BY resolved, resolution_status
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(tally(rows.into_iter().flat_map(|(resolved, status, count)| {
            let status = ResolutionStatus::from(status.as_str());
            std::iter::repeat((resolved, status)).take(count.max(0) as usize)
        })))
    }
}

/// Row mapping
#[derive(sqlx::FromRow)]
struct AlertRow {
    id: u64,
    camera_id: String,
    message: String,
    missing: String,
    level: String,
    image_ref: Option<String>,
    created_at: DateTime<Utc>,
    resolved: bool,
    resolution_status: String,
    resolution_notes: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<AlertRow> for AlertRecord {
    fn from(row: AlertRow) -> Self {
        Self {
            id: row.id,
            camera_id: row.camera_id,
            message: row.message,
            missing: row.missing,
            level: AlertLevel::from(row.level.as_str()),
            image_ref: row.image_ref,
            created_at: row.created_at,
            resolved: row.resolved,
            resolution_status: ResolutionStatus::from(row.resolution_status.as_str()),
            resolution_notes: row.resolution_notes,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
        }
    }
}
