//! Persisted job state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::ErrorCategory;
use super::progress::Phase;

/// Lifecycle status of an extraction job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details kept on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    pub category: ErrorCategory,
}

/// State of one extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// `{document_id}_{unix_seconds}`.
    pub job_id: String,
    pub owner_id: u64,
    pub document_id: u64,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    pub current_phase: String,
    pub message: String,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub completed_chunks: u32,
    #[serde(default)]
    pub failed_chunks: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a pending record stamped with `now`.
    pub fn new(owner_id: u64, document_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            job_id: make_job_id(document_id, now),
            owner_id,
            document_id,
            status: JobStatus::Pending,
            progress: 0,
            current_phase: Phase::Initializing.as_str().to_string(),
            message: "Extraction queued".to_string(),
            total_chunks: 0,
            completed_chunks: 0,
            failed_chunks: 0,
            error_info: None,
            result_ids: None,
            retry_count: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Builds a job id from the document id and creation time.
pub fn make_job_id(document_id: u64, created_at: DateTime<Utc>) -> String {
    format!("{}_{}", document_id, created_at.timestamp())
}
