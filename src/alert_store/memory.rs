//! In-memory alert store (ring buffer)

use super::types::*;
use super::{tally, validate_resolution, AlertRepository};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Ring buffer for alerts
struct AlertRingBuffer {
    alerts: VecDeque<AlertRecord>,
    capacity: usize,
    next_id: u64,
}

impl AlertRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, alert: NewAlert) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert.into_record(id));
        id
    }
}

/// MemoryAlertRepository instance
pub struct MemoryAlertRepository {
    buffer: RwLock<AlertRingBuffer>,
}

impl MemoryAlertRepository {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(AlertRingBuffer::new(capacity)),
        }
    }

    pub async fn count(&self) -> usize {
        self.buffer.read().await.alerts.len()
    }
}

impl Default for MemoryAlertRepository {
    fn default() -> Self {
        Self::new(2000)
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn create_alert(&self, alert: &NewAlert) -> Result<u64> {
        let id = self.buffer.write().await.push(alert.clone());
        tracing::debug!(alert_id = id, "Alert added to ring buffer");
        Ok(id)
    }

    async fn get_alert(&self, id: u64) -> Result<Option<AlertRecord>> {
        let buffer = self.buffer.read().await;
        Ok(buffer.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<AlertRecord>> {
        let buffer = self.buffer.read().await;
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(buffer
            .alerts
            .iter()
            .rev()
            .filter(|a| query.since.map(|s| a.created_at >= s).unwrap_or(true))
            .filter(|a| !query.unresolved_only || !a.resolved)
            .filter(|a| {
                query
                    .camera_id
                    .as_deref()
                    .map(|c| a.camera_id == c)
                    .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn resolve_alert(&self, id: u64, resolution: &AlertResolution) -> Result<AlertRecord> {
        validate_resolution(resolution)?;

        let mut buffer = self.buffer.write().await;
        let alert = buffer
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("alert {}", id)))?;

        alert.resolved = true;
        alert.resolution_status = resolution.status;
        alert.resolution_notes = resolution.notes.clone();
        alert.resolved_by = Some(resolution.resolved_by.clone());
        alert.resolved_at = Some(Utc::now());
        if let Some(level) = resolution.level {
            alert.level = level;
        }

        Ok(alert.clone())
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<AlertStatistics> {
        let buffer = self.buffer.read().await;
        Ok(tally(
            buffer
                .alerts
                .iter()
                .filter(|a| a.created_at >= since)
                .map(|a| (a.resolved, a.resolution_status)),
        ))
    }
}
