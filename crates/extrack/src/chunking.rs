//! Page-range planning for chunked extraction.
//!
//! A document of N pages is split into overlapping windows so that content
//! spanning a page break is seen whole by at least one chunk.

use serde::{Deserialize, Serialize};

/// Default number of pages per chunk when the configured value is not positive.
pub const DEFAULT_PAGES_PER_CHUNK: i32 = 4;

/// An inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start >= 1 && start <= end, "invalid page range {start}-{end}");
        Self { start, end }
    }

    /// Number of pages covered by this range.
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }

    /// Label used in progress events, e.g. `pages 1-4`.
    pub fn label(&self) -> String {
        format!("pages {}-{}", self.start, self.end)
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Chunk sizing. Out-of-range values are corrected by the planner rather
/// than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_pages_per_chunk")]
    pub pages_per_chunk: i32,
    #[serde(default = "default_overlap_pages")]
    pub overlap_pages: i32,
}

fn default_pages_per_chunk() -> i32 {
    DEFAULT_PAGES_PER_CHUNK
}

fn default_overlap_pages() -> i32 {
    1
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: default_pages_per_chunk(),
            overlap_pages: default_overlap_pages(),
        }
    }
}

impl ChunkConfig {
    pub fn new(pages_per_chunk: i32, overlap_pages: i32) -> Self {
        Self {
            pages_per_chunk,
            overlap_pages,
        }
    }

    /// Returns the config with defaults applied: a non-positive chunk size
    /// becomes [`DEFAULT_PAGES_PER_CHUNK`] and a negative overlap becomes 0.
    pub fn normalized(&self) -> Self {
        Self {
            pages_per_chunk: if self.pages_per_chunk <= 0 {
                DEFAULT_PAGES_PER_CHUNK
            } else {
                self.pages_per_chunk
            },
            overlap_pages: self.overlap_pages.max(0),
        }
    }

    /// Pages to advance between chunk starts. Always at least 1.
    pub fn step(&self) -> i32 {
        let normalized = self.normalized();
        (normalized.pages_per_chunk - normalized.overlap_pages).max(1)
    }
}

/// Splits `total_pages` into overlapping page ranges.
///
/// Ranges start at page 1, advance by [`ChunkConfig::step`] and stop once a
/// range reaches the last page. The final range may be shorter than
/// `pages_per_chunk`.
pub fn calculate_chunks(total_pages: i32, config: &ChunkConfig) -> Vec<PageRange> {
    if total_pages <= 0 {
        return Vec::new();
    }

    let config = config.normalized();
    // Widened so sizes near i32::MAX cannot overflow the window arithmetic.
    let total = i64::from(total_pages);
    let size = i64::from(config.pages_per_chunk);
    let step = i64::from(config.step());
    let mut chunks = Vec::new();
    let mut start: i64 = 1;

    while start <= total {
        let end = (start + size - 1).min(total);
        chunks.push(PageRange::new(start as u32, end as u32));

        if end >= total {
            break;
        }
        start += step;
    }

    log::debug!(
        "Calculated {} chunks for {} pages (pages_per_chunk={}, overlap={})",
        chunks.len(),
        total_pages,
        config.pages_per_chunk,
        config.overlap_pages
    );

    chunks
}
