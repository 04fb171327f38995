use thiserror::Error;

use crate::error::TrackerError;

/// Error type returned by extraction collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The job was cancelled. Its record is already terminal.
    #[error("Job {job_id} was cancelled")]
    Cancelled { job_id: String },

    #[error("No chunks to extract for a document of {total_pages} pages")]
    NoChunks { total_pages: i32 },

    #[error("{failed} of {total} chunks failed; last error: {last_error}")]
    TooManyFailures {
        failed: usize,
        total: usize,
        last_error: String,
    },

    #[error("Merge failed: {0}")]
    Merge(#[source] BoxError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}
