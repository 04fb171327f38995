use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::chunking::{calculate_chunks, ChunkConfig, PageRange};
use crate::config::{RunnerConfig, TrackerConfig};
use crate::tracker::{
    calculate_progress, classify_error_chain, classify_message, CancellationProbe,
    Classification, JobRecord, JobStatus, JobTracker, Phase, ProgressEvent,
};

use super::error::PipelineError;
use super::extract::{ChunkExtractor, ChunkMerger, ChunkOutput};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The completed job record.
    pub record: JobRecord,
    /// Successful chunk outputs, ordered by chunk index.
    pub chunks: Vec<ChunkOutput>,
    pub failed_chunks: usize,
    pub result_ids: Vec<u64>,
}

/// A chunk that exhausted its attempts.
struct ChunkFailure {
    index: usize,
    error: String,
}

/// Per-run state shared by the chunk tasks.
struct RunState<'a> {
    job_id: &'a str,
    probe: CancellationProbe,
    total_chunks: u32,
    completed: AtomicU32,
    failed: AtomicU32,
}

impl RunState<'_> {
    fn extraction_progress(&self) -> u8 {
        calculate_progress(
            Phase::Extraction.as_str(),
            self.completed.load(Ordering::Acquire),
            self.total_chunks,
        )
    }
}

/// Drives one document through chunked extraction, reporting every step to
/// the [`JobTracker`].
pub struct ExtractionRunner {
    tracker: Arc<JobTracker>,
    chunking: ChunkConfig,
    config: RunnerConfig,
}

impl ExtractionRunner {
    pub fn new(tracker: Arc<JobTracker>, chunking: ChunkConfig, config: RunnerConfig) -> Self {
        Self {
            tracker,
            chunking,
            config,
        }
    }

    pub fn from_config(tracker: Arc<JobTracker>, config: &TrackerConfig) -> Self {
        Self::new(tracker, config.chunking, config.runner.clone())
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Runs extraction for an existing job.
    ///
    /// Failures other than cancellation are recorded on the job as an error
    /// event before being returned.
    pub async fn run(
        &self,
        job_id: &str,
        total_pages: i32,
        extractor: &dyn ChunkExtractor,
        merger: &dyn ChunkMerger,
    ) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        let mut phase = Phase::Initializing;

        let result = self
            .run_steps(job_id, total_pages, extractor, merger, started, &mut phase)
            .instrument(info_span!("extraction", job_id = %job_id, total_pages))
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_cancelled() => {
                info!("Extraction job {} stopped after cancellation", job_id);
                Err(e)
            }
            Err(e) => {
                let classification = classify_error_chain(&e);
                warn!(
                    "Extraction job {} failed during {} ({}): {}",
                    job_id, phase, classification.category, e
                );
                let event = ProgressEvent::error(phase.as_str(), &e.to_string(), classification)
                    .with_elapsed_ms(elapsed_ms(started));
                if let Err(report_err) = self.tracker.apply_event(job_id, &event).await {
                    warn!(
                        "Failed to record failure of job {}: {}",
                        job_id, report_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        job_id: &str,
        total_pages: i32,
        extractor: &dyn ChunkExtractor,
        merger: &dyn ChunkMerger,
        started: Instant,
        phase: &mut Phase,
    ) -> Result<RunOutcome, PipelineError> {
        let probe = self.tracker.probe(job_id);
        probe.check().await?;

        self.emit(job_id, ProgressEvent::started("Starting extraction")).await?;

        // Plan chunks
        *phase = Phase::Chunking;
        self.emit(
            job_id,
            ProgressEvent::progress(Phase::Chunking, "Planning page chunks", 0, 0),
        )
        .await?;
        let chunks = calculate_chunks(total_pages, &self.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::NoChunks { total_pages });
        }
        let total_chunks = chunks.len() as u32;
        info!(
            "Split {} pages into {} chunks for job {}",
            total_pages, total_chunks, job_id
        );

        // Extract chunks
        *phase = Phase::Extraction;
        self.emit(
            job_id,
            ProgressEvent::progress(
                Phase::Extraction,
                &format!("Extracting {} chunks", total_chunks),
                0,
                total_chunks,
            ),
        )
        .await?;

        let state = RunState {
            job_id,
            probe,
            total_chunks,
            completed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        };
        let (mut outputs, failures) = self.extract_all(&state, extractor, &chunks).await?;

        let failed = failures.len();
        if failed > 0 {
            let ratio = failed as f64 / chunks.len() as f64;
            let last_error = failures
                .iter()
                .max_by_key(|f| f.index)
                .map(|f| f.error.clone())
                .unwrap_or_default();
            if failed == chunks.len() || ratio > self.config.max_failure_ratio {
                return Err(PipelineError::TooManyFailures {
                    failed,
                    total: chunks.len(),
                    last_error,
                });
            }
            warn!(
                "Continuing job {} with {}/{} failed chunks",
                job_id,
                failed,
                chunks.len()
            );
        }
        outputs.sort_by_key(|o| o.index);

        // Merge
        state.probe.check().await?;
        *phase = Phase::Merge;
        let mut event = ProgressEvent::progress(
            Phase::Merge,
            &format!("Merging results from {} chunks", outputs.len()),
            0,
            0,
        )
        .with_chunks(outputs.len() as u32, total_chunks);
        event.failed_chunks = failed as u32;
        self.emit(job_id, event).await?;

        let result_ids = merger
            .merge(&outputs)
            .instrument(info_span!("merge", chunks = outputs.len()))
            .await
            .map_err(PipelineError::Merge)?;

        // Save
        state.probe.check().await?;
        *phase = Phase::Save;
        self.emit(
            job_id,
            ProgressEvent::progress(Phase::Save, "Saving extraction results", 0, 0),
        )
        .await?;

        *phase = Phase::Complete;
        let event = ProgressEvent::complete(
            &format!("Extracted {} results", result_ids.len()),
            result_ids.clone(),
        )
        .with_elapsed_ms(elapsed_ms(started));
        let record = self.emit(job_id, event).await?;

        info!(
            "Extraction job {} completed in {}ms with {} results",
            job_id,
            elapsed_ms(started),
            result_ids.len()
        );

        Ok(RunOutcome {
            record,
            chunks: outputs,
            failed_chunks: failed,
            result_ids,
        })
    }

    /// Extracts every chunk with bounded concurrency. Cancellation or a
    /// tracker failure in any chunk aborts the run.
    async fn extract_all(
        &self,
        state: &RunState<'_>,
        extractor: &dyn ChunkExtractor,
        chunks: &[PageRange],
    ) -> Result<(Vec<ChunkOutput>, Vec<ChunkFailure>), PipelineError> {
        let results: Vec<_> = stream::iter(chunks.iter().copied().enumerate())
            .map(|(index, range)| {
                self.extract_chunk(state, extractor, index, range)
                    .instrument(info_span!("chunk", index, pages = %range))
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut outputs = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        let mut abort = None;
        for result in results {
            match result {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(failure)) => failures.push(failure),
                // Cancellation wins over any other abort reason.
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => abort = abort.or(Some(e)),
            }
        }
        if let Some(e) = abort {
            return Err(e);
        }

        Ok((outputs, failures))
    }

    async fn extract_chunk(
        &self,
        state: &RunState<'_>,
        extractor: &dyn ChunkExtractor,
        index: usize,
        range: PageRange,
    ) -> Result<Result<ChunkOutput, ChunkFailure>, PipelineError> {
        state.probe.check().await?;

        let number = index as u32 + 1;
        let mut event = ProgressEvent::info(
            Phase::Extraction.as_str(),
            &format!("Processing chunk {}/{}", number, state.total_chunks),
        )
        .with_progress(state.extraction_progress());
        event.current_chunk = number;
        event.page_range = Some(range.label());
        self.emit_best_effort(state.job_id, event).await;

        let mut attempt = 1;
        loop {
            let chunk_started = Instant::now();
            let (message, classification) =
                match tokio::time::timeout(self.config.chunk_timeout(), extractor.extract(range))
                    .await
                {
                    Ok(Ok(text)) => {
                        let done = state.completed.fetch_add(1, Ordering::AcqRel) + 1;
                        debug!(
                            "Chunk {} ({}) extracted in {}ms",
                            number,
                            range.label(),
                            elapsed_ms(chunk_started)
                        );
                        let mut event = ProgressEvent::progress(
                            Phase::Extraction,
                            &format!("Completed chunk {}/{}", done, state.total_chunks),
                            done,
                            state.total_chunks,
                        )
                        .with_elapsed_ms(elapsed_ms(chunk_started));
                        event.current_chunk = number;
                        event.page_range = Some(range.label());
                        self.emit(state.job_id, event).await?;

                        return Ok(Ok(ChunkOutput {
                            index,
                            range,
                            text,
                            attempts: attempt,
                        }));
                    }
                    Ok(Err(e)) => {
                        let classification: Classification = classify_error_chain(&*e);
                        (e.to_string(), classification)
                    }
                    Err(_) => {
                        let message = format!(
                            "chunk extraction timeout after {}s",
                            self.config.chunk_timeout_secs
                        );
                        let classification = classify_message(&message);
                        (message, classification)
                    }
                };

            if !classification.recoverable || attempt >= self.config.max_retries {
                let failed = state.failed.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(
                    "Chunk {} ({}) failed after {} attempt(s): {}",
                    number,
                    range.label(),
                    attempt,
                    message
                );
                let mut event = ProgressEvent::warning(
                    Phase::Extraction.as_str(),
                    &format!("Chunk {} failed", number),
                    &message,
                    0,
                )
                .with_progress(state.extraction_progress());
                event.error_category = Some(classification.category);
                event.recoverable = false;
                event.failed_chunks = failed;
                event.current_chunk = number;
                event.page_range = Some(range.label());
                self.emit_best_effort(state.job_id, event).await;

                return Ok(Err(ChunkFailure {
                    index,
                    error: message,
                }));
            }

            let delay = self.config.backoff_for(attempt);
            debug!(
                "Chunk {} attempt {} failed ({}), retrying in {:?}",
                number, attempt, classification.category, delay
            );
            let mut event = ProgressEvent::warning(
                Phase::Extraction.as_str(),
                &format!(
                    "Retrying chunk {}/{} (attempt {} of {})",
                    number,
                    state.total_chunks,
                    attempt + 1,
                    self.config.max_retries
                ),
                &message,
                attempt,
            )
            .with_progress(state.extraction_progress());
            event.error_category = Some(classification.category);
            event.max_retries = self.config.max_retries;
            event.current_chunk = number;
            event.page_range = Some(range.label());
            self.emit_best_effort(state.job_id, event).await;

            tokio::time::sleep(delay).await;
            state.probe.check().await?;
            attempt += 1;
        }
    }

    /// Records an event the run depends on. The tracker ignores events for
    /// a cancelled record and hands it back unchanged; that is reported as
    /// cancellation even after the flag itself has expired.
    async fn emit(&self, job_id: &str, event: ProgressEvent) -> Result<JobRecord, PipelineError> {
        let record = self.tracker.apply_event(job_id, &event).await?;
        if record.status == JobStatus::Cancelled {
            return Err(PipelineError::Cancelled {
                job_id: job_id.to_string(),
            });
        }
        Ok(record)
    }

    /// Telemetry that must not fail the chunk.
    async fn emit_best_effort(&self, job_id: &str, event: ProgressEvent) {
        if let Err(e) = self.tracker.apply_event(job_id, &event).await {
            warn!("Failed to emit progress for job {}: {}", job_id, e);
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
