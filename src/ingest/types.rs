// src/ingest/types.rs
use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ingest::error::FetchError;

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[end - 365*years days, end)`.
    pub fn trailing_years(end: DateTime<Utc>, years: u32) -> Self {
        Self {
            start: end - Duration::days(365 * i64::from(years)),
            end,
        }
    }

    /// Span in 365-day years (0 for empty or inverted windows).
    pub fn years(&self) -> f64 {
        let secs = (self.end - self.start).num_seconds().max(0) as f64;
        secs / (365.0 * 24.0 * 3600.0)
    }

    /// Month used for rows whose timestamp can't be read.
    pub fn default_month(&self) -> u32 {
        self.start.month()
    }
}

/// One unit of fetch work. Built once per run, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkDescriptor {
    /// A subset of stations over a (possibly sliced) time window.
    StationGroup {
        stations: Vec<String>,
        window: TimeWindow,
    },
    /// A time slice with no station dimension.
    TimeSlice { window: TimeWindow },
}

impl ChunkDescriptor {
    pub fn window(&self) -> &TimeWindow {
        match self {
            ChunkDescriptor::StationGroup { window, .. } => window,
            ChunkDescriptor::TimeSlice { window } => window,
        }
    }

    pub fn stations(&self) -> &[String] {
        match self {
            ChunkDescriptor::StationGroup { stations, .. } => stations,
            ChunkDescriptor::TimeSlice { .. } => &[],
        }
    }
}

/// GET request against an archive endpoint: URL + ordered query pairs
/// (order matters for repeated keys such as `station`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl ArchiveRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A single raw report plus the month it was observed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportText {
    pub text: String,
    pub month: u32,
}

/// Response body as it arrives from the wire.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Something that can open a streamed response for an [`ArchiveRequest`].
#[async_trait::async_trait]
pub trait ArchiveTransport: Send + Sync {
    async fn open(&self, request: &ArchiveRequest) -> Result<ByteStream, FetchError>;
    fn name(&self) -> &'static str;
}
