// src/ingest/mod.rs
//! Resumable archive ingestion.
//!
//! A run walks a fixed chunk plan through explicit stages:
//!
//! ```text
//! Init -> Fetch(i) -> Checkpoint(i) -> Fetch(i+1) -> ... -> Finalize -> Done
//! ```
//!
//! The only cross-restart state is the checkpoint (counters, the chunk plan
//! and `next_chunk_index`), so resuming is replaying that plan from the index.

pub mod archive;
pub mod checkpoint;
pub mod error;
pub mod plan;
pub mod providers;
pub mod retry;
pub mod stations;
pub mod stream;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::analyze::canonical_keys;
use crate::ingest::archive::ArchiveSpec;
use crate::ingest::checkpoint::{CheckpointStore, TrainingCheckpoint};
use crate::ingest::error::{FetchError, IngestError};
use crate::ingest::plan::{plan_chunks, ChunkingPolicy};
use crate::ingest::retry::RetryPolicy;
use crate::ingest::stream::{for_each_report, StreamSummary};
use crate::ingest::types::{ArchiveTransport, ChunkDescriptor, TimeWindow};
use crate::rarity::{RarityAggregator, RarityModel, DEFAULT_ALPHA};
use crate::store::{ModelStore, SnapshotMeta};

pub const DEFAULT_MAX_TEXT_LEN: usize = 500_000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_rows_total", "Data rows streamed from archive responses.");
        describe_counter!("ingest_reports_total", "Reports aggregated into the model.");
        describe_counter!(
            "ingest_rows_skipped_total",
            "Rows skipped as empty, short or oversize."
        );
        describe_counter!("ingest_retries_total", "Chunk fetch retries after transient errors.");
        describe_counter!(
            "ingest_schema_errors_total",
            "Responses missing a required column."
        );
        describe_counter!("ingest_chunks_completed_total", "Chunks fully aggregated.");
        describe_gauge!("ingest_vocab_size", "Distinct canonical tokens seen so far.");
        describe_gauge!("ingest_next_chunk", "Index of the next chunk to fetch.");
        describe_histogram!("ingest_chunk_ms", "Wall time per completed chunk in milliseconds.");
    });
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// All chunks aggregated; the snapshot is stored and the checkpoint gone.
    Completed(RarityModel),
    /// Stopped at a chunk boundary; the checkpoint (if any) points here.
    Interrupted { next_chunk_index: usize },
}

#[derive(Debug)]
enum Stage {
    Init,
    Fetch(usize),
    Checkpoint(usize),
    Finalize,
    Done(TrainOutcome),
}

/// Drives one archive family from the first chunk to a stored snapshot.
pub struct TrainingPipeline {
    transport: Box<dyn ArchiveTransport>,
    archive: ArchiveSpec,
    store: ModelStore,
    retry: RetryPolicy,
    alpha: f64,
    max_text_len: usize,
    stop: Arc<AtomicBool>,
    note: Option<String>,
}

impl TrainingPipeline {
    pub fn new(
        transport: Box<dyn ArchiveTransport>,
        archive: ArchiveSpec,
        store: ModelStore,
    ) -> Self {
        Self {
            transport,
            archive,
            store,
            retry: RetryPolicy::default(),
            alpha: DEFAULT_ALPHA,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            stop: Arc::new(AtomicBool::new(false)),
            note: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    /// Share an external stop flag (e.g. set from a Ctrl-C handler).
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn archive(&self) -> &ArchiveSpec {
        &self.archive
    }

    /// Aggregate every chunk of the plan and store the snapshot.
    ///
    /// With a checkpoint handle, an existing checkpoint is resumed (its pinned
    /// window and chunk plan replace `window`, `stations` and `policy`) and a
    /// new one is written after every chunk. `stations` is ignored for
    /// archives without a station dimension. An empty plan is an error, so an
    /// existing snapshot is never replaced by an empty model.
    pub async fn run(
        &self,
        window: TimeWindow,
        stations: &[String],
        policy: &ChunkingPolicy,
        checkpoint: Option<&CheckpointStore>,
    ) -> Result<TrainOutcome, IngestError> {
        ensure_metrics_described();

        let family = self.archive.family.as_str();
        let mut window = window;
        let mut agg = RarityAggregator::new();
        let mut plan: Vec<ChunkDescriptor> = Vec::new();
        let mut stage = Stage::Init;

        loop {
            stage = match stage {
                Stage::Init => {
                    let mut start = 0usize;
                    let mut pinned_plan = None;
                    if let Some(cp) = checkpoint.and_then(CheckpointStore::load) {
                        if cp.archive.as_deref().is_some_and(|a| a != family) {
                            tracing::warn!(
                                target: "train",
                                checkpoint_archive = ?cp.archive,
                                archive = family,
                                "checkpoint belongs to another archive; ignoring it"
                            );
                        } else {
                            if let Some(pinned) = cp.window {
                                if pinned != window {
                                    tracing::info!(
                                        target: "train",
                                        start = %pinned.start,
                                        end = %pinned.end,
                                        "using window pinned by checkpoint"
                                    );
                                }
                                window = pinned;
                            }
                            agg = RarityAggregator::from_counters(cp.counters());
                            start = cp.next_chunk_index;
                            pinned_plan = cp.plan;
                        }
                    }

                    let stations: &[String] = if self.archive.needs_stations() {
                        stations
                    } else {
                        &[]
                    };
                    let fresh = || {
                        plan_chunks(&window, stations, &self.archive.effective_policy(policy))
                    };
                    plan = match pinned_plan {
                        Some(pinned) => {
                            if pinned != fresh() {
                                tracing::info!(
                                    target: "train",
                                    chunks = pinned.len(),
                                    "station list or chunking changed; resuming the checkpoint plan"
                                );
                            }
                            pinned
                        }
                        None => fresh(),
                    };
                    if plan.is_empty() {
                        return Err(IngestError::EmptyPlan {
                            archive: family.to_string(),
                        });
                    }
                    if start > plan.len() {
                        tracing::warn!(target: "train", start, chunks = plan.len(), "checkpoint index past end of plan");
                        start = plan.len();
                    }
                    tracing::info!(
                        target: "train",
                        archive = family,
                        transport = self.transport.name(),
                        chunks = plan.len(),
                        resume_at = start,
                        events = agg.total_events(),
                        "training plan ready"
                    );
                    Stage::Fetch(start)
                }
                Stage::Fetch(i) if i >= plan.len() => Stage::Finalize,
                Stage::Fetch(i) => {
                    if self.stop.load(Ordering::SeqCst) {
                        tracing::info!(target: "train", next_chunk = i, "stop requested; leaving at chunk boundary");
                        Stage::Done(TrainOutcome::Interrupted { next_chunk_index: i })
                    } else {
                        let t0 = Instant::now();
                        let (scratch, summary) = self.fetch_chunk(i, &plan[i]).await?;
                        agg.merge(scratch);
                        histogram!("ingest_chunk_ms").record(t0.elapsed().as_secs_f64() * 1000.0);
                        counter!("ingest_chunks_completed_total").increment(1);
                        gauge!("ingest_vocab_size").set(agg.vocab_size() as f64);
                        tracing::info!(
                            target: "ingest",
                            chunk = i + 1,
                            of = plan.len(),
                            rows = summary.rows,
                            reports = summary.reports,
                            vocab = agg.vocab_size(),
                            events = agg.total_events(),
                            "chunk done"
                        );
                        Stage::Checkpoint(i)
                    }
                }
                Stage::Checkpoint(i) => {
                    let next = i + 1;
                    if let Some(store) = checkpoint {
                        let cp = TrainingCheckpoint::new(
                            agg.counters(),
                            next,
                            Some(window),
                            Some(family.to_string()),
                        )
                        .with_plan(plan.clone());
                        store.save(&cp)?;
                        tracing::debug!(target: "train", next_chunk = next, path = %store.path().display(), "checkpoint saved");
                    }
                    gauge!("ingest_next_chunk").set(next as f64);
                    Stage::Fetch(next)
                }
                Stage::Finalize => {
                    let model = std::mem::take(&mut agg).finalize(self.alpha);
                    let meta = SnapshotMeta {
                        trained_at_utc: Some(chrono::Utc::now()),
                        window_start_utc: Some(window.start),
                        window_end_utc: Some(window.end),
                        archive: Some(family.to_string()),
                        note: self.note.clone(),
                    };
                    self.store
                        .save(&model, &meta)
                        .map_err(|source| IngestError::ModelStore {
                            path: self.store.path().to_path_buf(),
                            source,
                        })?;
                    if let Some(store) = checkpoint {
                        if let Err(e) = store.delete() {
                            tracing::warn!(target: "train", path = %store.path().display(), error = %e, "could not remove checkpoint");
                        }
                    }
                    tracing::info!(
                        target: "train",
                        path = %self.store.path().display(),
                        vocab = model.vocab_all(),
                        events = model.total_all(),
                        "model snapshot written"
                    );
                    Stage::Done(TrainOutcome::Completed(model))
                }
                Stage::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Fetch and aggregate one chunk into a fresh aggregator, retrying the
    /// whole request on transient failures.
    async fn fetch_chunk(
        &self,
        index: usize,
        chunk: &ChunkDescriptor,
    ) -> Result<(RarityAggregator, StreamSummary), IngestError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.stream_chunk(chunk).await {
                Ok(done) => return Ok(done),
                Err(e) if !e.is_transient() => {
                    tracing::warn!(target: "ingest", chunk = index, error = %e, "chunk rejected");
                    return Err(IngestError::Rejected {
                        chunk: index,
                        source: e,
                    });
                }
                Err(e) if !self.retry.allows_retry(attempts) => {
                    return Err(IngestError::RetriesExhausted {
                        chunk: index,
                        attempts,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.retry.next_delay(attempts - 1);
                    counter!("ingest_retries_total").increment(1);
                    tracing::warn!(
                        target: "ingest",
                        chunk = index,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn stream_chunk(
        &self,
        chunk: &ChunkDescriptor,
    ) -> Result<(RarityAggregator, StreamSummary), FetchError> {
        let family = self.archive.family;
        let request = self.archive.request_for(chunk);
        let body = self.transport.open(&request).await?;

        let mut scratch = RarityAggregator::new();
        let summary = for_each_report(
            body,
            self.archive.columns(),
            chunk.window().default_month(),
            self.max_text_len,
            |report| {
                scratch.observe(canonical_keys(&report.text, family), report.month);
            },
        )
        .await?;

        counter!("ingest_rows_total").increment(summary.rows);
        counter!("ingest_reports_total").increment(summary.reports);
        counter!("ingest_rows_skipped_total").increment(summary.skipped);
        if summary.schema_error {
            counter!("ingest_schema_errors_total").increment(1);
        }
        Ok((scratch, summary))
    }
}
