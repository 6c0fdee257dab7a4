//! Model snapshot persistence.
//!
//! JSON shape (keys of the month maps are the strings "1".."12"):
//! {
//!   "alpha": 0.5,
//!   "total_all": 123,
//!   "vocab_all": 45,
//!   "counts_all": { "WIND": 10, ... },
//!   "totals_by_month": { "1": 10, ..., "12": 7 },
//!   "counts_by_month": { "1": { "WIND": 1, ... }, ... },
//!   "trained_at_utc": "...", "window_start_utc": "...", ...   (optional)
//! }
//!
//! A path ending in `.gz` is gzip-compressed on write and decompressed on read.
//! Writes land in a sibling temp file first and are renamed into place.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::rarity::{Counters, RarityModel, DEFAULT_ALPHA};

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

/// Optional provenance stored next to the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDoc {
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default)]
    total_all: Option<u64>,
    #[serde(default)]
    vocab_all: Option<u64>,
    counts_all: HashMap<String, u64>,
    totals_by_month: BTreeMap<u32, u64>,
    counts_by_month: BTreeMap<u32, HashMap<String, u64>>,
    // Provenance is spelled out field by field: `#[serde(flatten)]` would
    // buffer the document and break the integer month keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trained_at_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window_start_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window_end_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl SnapshotDoc {
    fn from_model(model: &RarityModel, meta: &SnapshotMeta) -> Self {
        let c = model.counters();
        Self {
            alpha: model.alpha(),
            total_all: Some(model.total_all()),
            vocab_all: Some(model.vocab_all()),
            counts_all: c.counts_all.clone(),
            totals_by_month: c.totals_by_month.clone(),
            counts_by_month: c.counts_by_month.clone(),
            trained_at_utc: meta.trained_at_utc,
            window_start_utc: meta.window_start_utc,
            window_end_utc: meta.window_end_utc,
            archive: meta.archive.clone(),
            note: meta.note.clone(),
        }
    }

    fn into_model(self) -> Result<(RarityModel, SnapshotMeta)> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            bail!("snapshot alpha must be a positive number, got {}", self.alpha);
        }
        // Older snapshots may omit the derived totals; recompute them.
        let total_all = self
            .total_all
            .unwrap_or_else(|| self.counts_all.values().sum());
        let vocab_all = self
            .vocab_all
            .unwrap_or(self.counts_all.len() as u64);
        let meta = SnapshotMeta {
            trained_at_utc: self.trained_at_utc,
            window_start_utc: self.window_start_utc,
            window_end_utc: self.window_end_utc,
            archive: self.archive,
            note: self.note,
        };
        let counters = Counters {
            counts_all: self.counts_all,
            total_all,
            totals_by_month: self.totals_by_month,
            counts_by_month: self.counts_by_month,
        };
        Ok((RarityModel::from_parts(self.alpha, vocab_all, counters), meta))
    }
}

/// Where finished snapshots are written.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, model: &RarityModel, meta: &SnapshotMeta) -> io::Result<()> {
        write_document(&self.path, &SnapshotDoc::from_model(model, meta))
    }

    pub fn load(&self) -> Result<RarityModel> {
        load_model(&self.path)
    }
}

/// Load a snapshot; fails if any of the three count maps is missing.
pub fn load_model(path: &Path) -> Result<RarityModel> {
    load_snapshot(path).map(|(model, _)| model)
}

/// Like [`load_model`] but also returns the provenance block.
pub fn load_snapshot(path: &Path) -> Result<(RarityModel, SnapshotMeta)> {
    let doc: SnapshotDoc = read_document(path)
        .with_context(|| format!("reading rarity model from {}", path.display()))?;
    doc.into_model()
        .with_context(|| format!("invalid rarity model in {}", path.display()))
}

/// Parse a snapshot from an in-memory JSON string.
pub fn model_from_json(s: &str) -> Result<RarityModel> {
    let doc: SnapshotDoc = serde_json::from_str(s).context("parsing rarity model json")?;
    doc.into_model().map(|(model, _)| model)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("gz")
}

pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let mut reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Serialize `value` to `path` via temp file + rename.
pub(crate) fn write_document<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = BufWriter::new(File::create(&tmp)?);
    if is_gzip(path) {
        let mut enc = GzEncoder::new(&mut file, Compression::default());
        serde_json::to_writer(&mut enc, value)?;
        enc.finish()?;
    } else {
        serde_json::to_writer(&mut file, value)?;
    }
    file.flush()?;
    drop(file);
    fs::rename(&tmp, path)
}
