//! Alert store data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    High,
    Medium,
    Low,
    Positive,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::High => "high",
            AlertLevel::Medium => "medium",
            AlertLevel::Low => "low",
            AlertLevel::Positive => "positive",
        }
    }
}

impl From<&str> for AlertLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "medium" => Self::Medium,
            "low" => Self::Low,
            "positive" => Self::Positive,
            _ => Self::High,
        }
    }
}

/// Resolution status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    Resolved,
    FalsePositive,
    /// Confirmed real non-compliance
    NonCompliant,
    SystemError,
}

impl ResolutionStatus {
    pub const ALL: [ResolutionStatus; 5] = [
        ResolutionStatus::Pending,
        ResolutionStatus::Resolved,
        ResolutionStatus::FalsePositive,
        ResolutionStatus::NonCompliant,
        ResolutionStatus::SystemError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::FalsePositive => "false_positive",
            ResolutionStatus::NonCompliant => "non_compliant",
            ResolutionStatus::SystemError => "system_error",
        }
    }
}

impl From<&str> for ResolutionStatus {
    fn from(s: &str) -> Self {
        match s {
            "resolved" => Self::Resolved,
            "false_positive" => Self::FalsePositive,
            "non_compliant" => Self::NonCompliant,
            "system_error" => Self::SystemError,
            _ => Self::Pending,
        }
    }
}

/// Stored alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    pub camera_id: String,
    pub message: String,
    /// Missing items, comma separated display names
    pub missing: String,
    pub level: AlertLevel,
    /// Relative image path under the media directory
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_status: ResolutionStatus,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Alert creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub camera_id: String,
    pub message: String,
    pub missing: String,
    pub level: AlertLevel,
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_record(self, id: u64) -> AlertRecord {
        AlertRecord {
            id,
            camera_id: self.camera_id,
            message: self.message,
            missing: self.missing,
            level: self.level,
            image_ref: self.image_ref,
            created_at: self.created_at,
            resolved: false,
            resolution_status: ResolutionStatus::Pending,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
        }
    }
}

/// Resolution action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResolution {
    pub status: ResolutionStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub resolved_by: String,
    /// Optional level reassessment
    #[serde(default)]
    pub level: Option<AlertLevel>,
}

/// Alert list filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unresolved_only: bool,
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Alert counts for a time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total: u64,
    pub unresolved: u64,
    pub resolved: u64,
    /// Percentage of alerts resolved (0 when there are none)
    pub resolution_rate: f64,
    /// Count per resolution status
    pub by_status: Vec<(ResolutionStatus, u64)>,
}
