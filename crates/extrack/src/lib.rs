pub mod broadcast;
pub mod chunking;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod tracker;

pub use broadcast::JobUpdateBroadcaster;
pub use chunking::{calculate_chunks, ChunkConfig, PageRange};
pub use config::{load_config, TrackerConfig};
pub use error::{ConfigError, ExtrackError, Result, StoreError, TrackerError};
pub use pipeline::{ChunkExtractor, ChunkMerger, ChunkOutput, ExtractionRunner, PipelineError};
pub use store::{open_store, JobStore, MemoryStore, SqliteStore};
pub use tracker::{
    classify_error, classify_message, CancellationProbe, ErrorCategory, EventType, JobRecord,
    JobStatus, JobTracker, ProgressEvent,
};
