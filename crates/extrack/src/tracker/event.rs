//! Progress events emitted by pipeline workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::{Classification, ErrorCategory};
use super::progress::{calculate_progress, Phase};

/// Kind of progress event. Decides the status transition applied to the job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Started,
    Progress,
    Warning,
    Complete,
    Error,
    Info,
    Debug,
}

/// A state transition reported by a worker. Folded into the job record by
/// the tracker; never stored as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// 0-100.
    pub progress: u8,
    pub phase: String,
    pub message: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub completed_chunks: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_chunks: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_chunk: u32,
    /// e.g. `pages 1-4`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_retries: u32,
    #[serde(default)]
    pub recoverable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_ids: Vec<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ProgressEvent {
    /// Creates an event with the given type, phase and message. Progress is
    /// derived from the phase with no unit counters.
    pub fn new(event_type: EventType, phase: &str, message: &str) -> Self {
        Self {
            event_type,
            progress: calculate_progress(phase, 0, 0),
            phase: phase.to_string(),
            message: message.to_string(),
            total_chunks: 0,
            completed_chunks: 0,
            failed_chunks: 0,
            current_chunk: 0,
            page_range: None,
            detail: None,
            error_category: None,
            error_message: None,
            retry_count: 0,
            max_retries: 0,
            recoverable: false,
            result_ids: Vec::new(),
            elapsed_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Worker picked the job up.
    pub fn started(message: &str) -> Self {
        Self::new(EventType::Started, Phase::Initializing.as_str(), message)
    }

    /// Phase progress, with progress computed by the phase-band model.
    pub fn progress(phase: Phase, message: &str, completed: u32, total: u32) -> Self {
        let mut event = Self::new(EventType::Progress, phase.as_str(), message);
        event.progress = calculate_progress(phase.as_str(), completed, total);
        event.completed_chunks = completed;
        event.total_chunks = total;
        event
    }

    /// Telemetry-only event; does not change status.
    pub fn info(phase: &str, message: &str) -> Self {
        Self::new(EventType::Info, phase, message)
    }

    /// Recoverable trouble, e.g. a chunk retry.
    pub fn warning(phase: &str, message: &str, error: &str, retry_count: u32) -> Self {
        let mut event = Self::new(EventType::Warning, phase, message);
        event.error_message = Some(error.to_string());
        event.retry_count = retry_count;
        event.recoverable = true;
        event
    }

    /// Job finished successfully with the given artifact ids.
    pub fn complete(message: &str, result_ids: Vec<u64>) -> Self {
        let mut event = Self::new(EventType::Complete, Phase::Complete.as_str(), message);
        event.result_ids = result_ids;
        event
    }

    /// Job failed. The error text is classified for downstream retry policy.
    pub fn error(phase: &str, error_message: &str, classification: Classification) -> Self {
        let mut event = Self::new(EventType::Error, phase, "Extraction failed");
        event.progress = 0;
        event.error_category = Some(classification.category);
        event.error_message = Some(error_message.to_string());
        event.recoverable = classification.recoverable;
        event
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_chunks(mut self, completed: u32, total: u32) -> Self {
        self.completed_chunks = completed;
        self.total_chunks = total;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}
