pub mod error;
pub mod extract;
pub mod runner;

pub use error::{BoxError, PipelineError};
pub use extract::{ChunkExtractor, ChunkMerger, ChunkOutput};
pub use runner::{ExtractionRunner, RunOutcome};
