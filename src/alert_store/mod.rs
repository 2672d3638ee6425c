//! AlertStore - Alert persistence
//!
//! ## Responsibilities
//!
//! - `AlertRepository` seam used by the recorder and the API
//! - Creation contract (message, missing CSV, level, image ref, timestamp)
//! - Resolution action, listing and statistics
//!
//! Backends: `MySqlAlertRepository` (sqlx) and `MemoryAlertRepository`.
//! Neither deduplicates: callers enforce cooldowns.

mod memory;
mod repository;
mod types;

pub use memory::MemoryAlertRepository;
pub use repository::MySqlAlertRepository;
pub use types::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Alert persistence collaborator
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Store a new alert and return its id
    async fn create_alert(&self, alert: &NewAlert) -> Result<u64>;

    async fn get_alert(&self, id: u64) -> Result<Option<AlertRecord>>;

    /// Newest first
    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<AlertRecord>>;

    /// Apply a resolution and return the updated record
    async fn resolve_alert(&self, id: u64, resolution: &AlertResolution) -> Result<AlertRecord>;

    async fn statistics(&self, since: DateTime<Utc>) -> Result<AlertStatistics>;
}

/// Reject resolutions that would not resolve anything
pub fn validate_resolution(resolution: &AlertResolution) -> Result<()> {
    if resolution.status == ResolutionStatus::Pending {
        return Err(Error::Validation(
            "pending is not a resolution status".to_string(),
        ));
    }
    if resolution.resolved_by.trim().is_empty() {
        return Err(Error::Validation("resolved_by must not be empty".to_string()));
    }
    Ok(())
}

/// Build statistics from (resolved, status) pairs
pub(crate) fn tally<I>(rows: I) -> AlertStatistics
where
    I: IntoIterator<Item = (bool, ResolutionStatus)>,
{
    let mut stats = AlertStatistics {
        by_status: ResolutionStatus::ALL.iter().map(|s| (*s, 0)).collect(),
        ..AlertStatistics::default()
    };

    for (resolved, status) in rows {
        stats.total += 1;
        if resolved {
            stats.resolved += 1;
        } else {
            stats.unresolved += 1;
        }
        if let Some(entry) = stats.by_status.iter_mut().find(|(s, _)| *s == status) {
            entry.1 += 1;
        }
    }

    if stats.total > 0 {
        stats.resolution_rate = stats.resolved as f64 / stats.total as f64 * 100.0;
    }
    stats
}
