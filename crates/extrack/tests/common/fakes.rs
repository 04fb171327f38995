//! Scripted collaborators for the extraction runner.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use extrack::pipeline::BoxError;
use extrack::{ChunkExtractor, ChunkMerger, ChunkOutput, PageRange};

/// Extractor returning `pages a-b`, failing chunks as scripted by start page.
#[derive(Default)]
pub struct ScriptedExtractor {
    failures: Mutex<HashMap<u32, (u32, String)>>,
    calls: AtomicU32,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the chunk starting at `start` the next `times` calls.
    pub fn failing(self, start: u32, times: u32, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(start, (times, message.to_string()));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkExtractor for ScriptedExtractor {
    async fn extract(&self, range: PageRange) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().unwrap();
        if let Some((remaining, message)) = failures.get_mut(&range.start) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(message.clone().into());
            }
        }
        Ok(range.label())
    }
}

/// Merger that records what it was given and returns fixed ids.
pub struct RecordingMerger {
    ids: Vec<u64>,
    seen: Mutex<Vec<ChunkOutput>>,
}

impl RecordingMerger {
    pub fn returning(ids: Vec<u64>) -> Self {
        Self {
            ids,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<ChunkOutput> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChunkMerger for RecordingMerger {
    async fn merge(&self, chunks: &[ChunkOutput]) -> Result<Vec<u64>, BoxError> {
        self.seen.lock().unwrap().extend_from_slice(chunks);
        Ok(self.ids.clone())
    }
}
