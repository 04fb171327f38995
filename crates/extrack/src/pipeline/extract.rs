//! Collaborator contracts for the extraction runner.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BoxError;
use crate::chunking::PageRange;

/// Pulls structured text out of one page range.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    async fn extract(&self, range: PageRange) -> Result<String, BoxError>;
}

/// Reconciles chunk outputs and persists the result, returning the ids of
/// the produced artifacts.
#[async_trait]
pub trait ChunkMerger: Send + Sync {
    async fn merge(&self, chunks: &[ChunkOutput]) -> Result<Vec<u64>, BoxError>;
}

/// Text extracted from one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkOutput {
    /// Position in the chunk plan, starting at 0.
    pub index: usize,
    pub range: PageRange,
    pub text: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}
