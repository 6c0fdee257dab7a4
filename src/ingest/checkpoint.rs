// src/ingest/checkpoint.rs
//! Durable resume point for a training run.
//!
//! Written after every completed chunk, replacing the previous one, and
//! removed once the final snapshot is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::ingest::error::IngestError;
use crate::ingest::types::{ChunkDescriptor, TimeWindow};
use crate::rarity::Counters;
use crate::store::{read_document, write_document};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    pub counts_all: HashMap<String, u64>,
    pub total_all: u64,
    pub totals_by_month: BTreeMap<u32, u64>,
    pub counts_by_month: BTreeMap<u32, HashMap<String, u64>>,
    /// First chunk (0-based) not yet reflected in the counters.
    pub next_chunk_index: usize,
    pub updated_at_utc: DateTime<Utc>,
    /// Window the chunk plan was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    /// The chunk plan `next_chunk_index` points into. A resumed run replays
    /// this list instead of planning again from a fresh station list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<ChunkDescriptor>>,
}

impl TrainingCheckpoint {
    pub fn new(
        counters: &Counters,
        next_chunk_index: usize,
        window: Option<TimeWindow>,
        archive: Option<String>,
    ) -> Self {
        Self {
            counts_all: counters.counts_all.clone(),
            total_all: counters.total_all,
            totals_by_month: counters.totals_by_month.clone(),
            counts_by_month: counters.counts_by_month.clone(),
            next_chunk_index,
            updated_at_utc: Utc::now(),
            window,
            archive,
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: Vec<ChunkDescriptor>) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn counters(&self) -> Counters {
        Counters {
            counts_all: self.counts_all.clone(),
            total_all: self.total_all,
            totals_by_month: self.totals_by_month.clone(),
            counts_by_month: self.counts_by_month.clone(),
        }
    }
}

/// File-backed checkpoint handle (`.gz` paths are compressed).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved checkpoint, if one is present and readable. An unreadable
    /// file is logged and treated as absent, so the run starts over.
    pub fn load(&self) -> Option<TrainingCheckpoint> {
        if !self.path.exists() {
            return None;
        }
        match read_document::<TrainingCheckpoint>(&self.path) {
            Ok(cp) if cp.counters().is_consistent() => Some(cp),
            Ok(_) => {
                tracing::warn!(target: "train", path = %self.path.display(), "checkpoint counters inconsistent; starting fresh");
                None
            }
            Err(e) => {
                tracing::warn!(target: "train", path = %self.path.display(), error = %e, "checkpoint unreadable; starting fresh");
                None
            }
        }
    }

    pub fn save(&self, checkpoint: &TrainingCheckpoint) -> Result<(), IngestError> {
        write_document(&self.path, checkpoint).map_err(|source| IngestError::Checkpoint {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the checkpoint; a missing file is fine.
    pub fn delete(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
