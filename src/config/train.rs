// src/config/train.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::ReportFamily;
use crate::ingest::archive::{default_policy, default_years, PirepFilter, IEM_BASE};
use crate::ingest::plan::ChunkingPolicy;
use crate::ingest::providers::HttpTransportConfig;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::DEFAULT_MAX_TEXT_LEN;
use crate::rarity::DEFAULT_ALPHA;

pub const ENV_PATH: &str = "TRAIN_CONFIG_PATH";
pub const DEFAULT_PATH: &str = "config/train.toml";

/// `[train]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainSection {
    pub archive: ReportFamily,
    /// Snapshot path; defaults to `models/<archive>_rarity.json.gz`.
    pub out: Option<PathBuf>,
    /// Checkpoint path; defaults to `models/<archive>_rarity.ckpt.json`.
    pub checkpoint: Option<PathBuf>,
    /// Trailing span in years; defaults per archive.
    pub years: Option<u32>,
    /// Overrides the day-window length of time-sliced archives.
    pub window_days: Option<u32>,
    pub alpha: f64,
    pub max_text_len: usize,
    pub base_url: String,
    pub note: Option<String>,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            archive: ReportFamily::Metar,
            out: None,
            checkpoint: None,
            years: None,
            window_days: None,
            alpha: DEFAULT_ALPHA,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            base_url: IEM_BASE.to_string(),
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train: TrainSection,
    pub retry: RetryPolicy,
    /// Per-archive default when absent.
    pub chunking: Option<ChunkingPolicy>,
    pub pirep: PirepFilter,
    pub http: HttpTransportConfig,
}

impl TrainConfig {
    pub fn out_path(&self) -> PathBuf {
        self.train.out.clone().unwrap_or_else(|| {
            PathBuf::from(format!("models/{}_rarity.json.gz", self.train.archive.as_str()))
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.train.checkpoint.clone().unwrap_or_else(|| {
            PathBuf::from(format!("models/{}_rarity.ckpt.json", self.train.archive.as_str()))
        })
    }

    pub fn years(&self) -> u32 {
        self.train
            .years
            .unwrap_or_else(|| default_years(self.train.archive))
    }

    /// Chunking for the configured archive, with `window_days` applied.
    pub fn policy(&self) -> ChunkingPolicy {
        let base = self
            .chunking
            .clone()
            .unwrap_or_else(|| default_policy(self.train.archive));
        match (base, self.train.window_days) {
            (
                ChunkingPolicy::DayWindows {
                    station_chunk_size, ..
                },
                Some(days),
            ) => ChunkingPolicy::DayWindows {
                window_days: days,
                station_chunk_size,
            },
            (other, _) => other,
        }
    }

    /// Apply `ARCHIVE`, `OUT`, `YEARS`, `ALPHA`, `CHECKPOINT`, `WINDOW_DAYS`
    /// from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("ARCHIVE") {
            self.train.archive = v.parse().with_context(|| format!("ARCHIVE={v}"))?;
        }
        if let Some(v) = get("OUT") {
            self.train.out = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CHECKPOINT") {
            self.train.checkpoint = Some(PathBuf::from(v));
        }
        if let Some(v) = get("YEARS") {
            self.train.years = Some(v.parse().with_context(|| format!("YEARS={v}"))?);
        }
        if let Some(v) = get("ALPHA") {
            self.train.alpha = v.parse().with_context(|| format!("ALPHA={v}"))?;
        }
        if let Some(v) = get("WINDOW_DAYS") {
            self.train.window_days = Some(v.parse().with_context(|| format!("WINDOW_DAYS={v}"))?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train.alpha.is_finite() && self.train.alpha > 0.0) {
            bail!("alpha must be positive, got {}", self.train.alpha);
        }
        if self.years() == 0 {
            bail!("years must be at least 1");
        }
        if self.train.window_days == Some(0) {
            bail!("window_days must be at least 1");
        }
        if self.train.max_text_len == 0 {
            bail!("max_text_len must be at least 1");
        }
        Ok(())
    }
}

/// Load config from an explicit TOML file.
pub fn load_from(path: &Path) -> Result<TrainConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading train config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing train config {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $TRAIN_CONFIG_PATH
/// 2) config/train.toml
/// 3) built-in defaults
pub fn load_default() -> Result<TrainConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("TRAIN_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_PATH);
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    Ok(TrainConfig::default())
}

/// [`load_default`] plus process env overrides, validated.
pub fn load_with_env() -> Result<TrainConfig> {
    let mut cfg = load_default()?;
    cfg.apply_overrides(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
