// src/ingest/archive.rs
//! Request shapes and CSV schemas of the three report archives.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::analyze::ReportFamily;
use crate::ingest::plan::ChunkingPolicy;
use crate::ingest::stream::ColumnSpec;
use crate::ingest::types::{ArchiveRequest, ChunkDescriptor, TimeWindow};

pub const IEM_BASE: &str = "https://mesonet.agron.iastate.edu";

/// Largest PIREP request window the archive serves without a spatial filter.
pub const UNFILTERED_PIREP_MAX_DAYS: u32 = 120;

const METAR_COLUMNS: ColumnSpec = ColumnSpec {
    text: &["metar"],
    timestamp: &["valid"],
    timestamp_required: true,
    extras: &[],
};

const TAF_COLUMNS: ColumnSpec = ColumnSpec {
    text: &["raw", "raw_taf", "taf", "product"],
    timestamp: &["issue", "issue_time", "issued", "issued_at", "valid", "timestamp", "time"],
    timestamp_required: false,
    extras: &[],
};

const PIREP_COLUMNS: ColumnSpec = ColumnSpec {
    text: &["report"],
    timestamp: &[
        "valid",
        "timestamp",
        "time",
        "report_time",
        "obs_time",
        "issued",
        "issue_time",
    ],
    timestamp_required: false,
    extras: &[("icing", "ICING"), ("turbulence", "TURB")],
};

/// Spatial pre-filter for PIREP requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PirepFilter {
    pub artcc: String,
    pub enabled: bool,
    pub lat: f64,
    pub lon: f64,
    pub degrees: f64,
}

impl Default for PirepFilter {
    fn default() -> Self {
        Self {
            artcc: "_ALL".to_string(),
            enabled: true,
            lat: 39.5,
            lon: -98.35,
            degrees: 30.0,
        }
    }
}

/// One archive family: where to ask and how to read the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSpec {
    pub family: ReportFamily,
    pub base_url: String,
    pub pirep: PirepFilter,
}

impl ArchiveSpec {
    pub fn new(family: ReportFamily) -> Self {
        Self {
            family,
            base_url: IEM_BASE.to_string(),
            pirep: PirepFilter::default(),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_pirep_filter(mut self, filter: PirepFilter) -> Self {
        self.pirep = filter;
        self
    }

    pub fn columns(&self) -> &'static ColumnSpec {
        match self.family {
            ReportFamily::Metar => &METAR_COLUMNS,
            ReportFamily::Taf => &TAF_COLUMNS,
            ReportFamily::Pirep => &PIREP_COLUMNS,
        }
    }

    /// Whether chunks are built from a station list.
    pub fn needs_stations(&self) -> bool {
        !matches!(self.family, ReportFamily::Pirep)
    }

    fn endpoint(&self) -> String {
        let path = match self.family {
            ReportFamily::Metar => "cgi-bin/request/asos.py",
            ReportFamily::Taf => "cgi-bin/request/taf.py",
            ReportFamily::Pirep => "cgi-bin/request/gis/pireps.py",
        };
        format!("{}/{}", self.base_url, path)
    }

    /// Unfiltered PIREP windows are capped; everything else passes through.
    pub fn effective_policy(&self, policy: &ChunkingPolicy) -> ChunkingPolicy {
        match (self.family, policy) {
            (
                ReportFamily::Pirep,
                ChunkingPolicy::DayWindows {
                    window_days,
                    station_chunk_size,
                },
            ) if !self.pirep.enabled && *window_days > UNFILTERED_PIREP_MAX_DAYS => {
                ChunkingPolicy::DayWindows {
                    window_days: UNFILTERED_PIREP_MAX_DAYS,
                    station_chunk_size: *station_chunk_size,
                }
            }
            _ => policy.clone(),
        }
    }

    /// The GET request that fetches `chunk`.
    pub fn request_for(&self, chunk: &ChunkDescriptor) -> ArchiveRequest {
        let TimeWindow { start, end } = *chunk.window();
        let mut req = ArchiveRequest::new(self.endpoint());
        match self.family {
            ReportFamily::Metar => {
                req = req
                    .param("data", "metar")
                    .param("format", "onlycomma")
                    .param("tz", "UTC")
                    .param("sts", fmt_seconds(start))
                    .param("ets", fmt_seconds(end));
            }
            ReportFamily::Taf => {
                req = req
                    .param("fmt", "csv")
                    .param("tz", "UTC")
                    .param("sts", fmt_minutes(start))
                    .param("ets", fmt_minutes(end));
            }
            ReportFamily::Pirep => {
                req = req
                    .param("fmt", "csv")
                    .param("sts", fmt_minutes(start))
                    .param("ets", fmt_minutes(end))
                    .param("artcc", self.pirep.artcc.clone());
                if self.pirep.enabled {
                    req = req
                        .param("filter", "1")
                        .param("lat", self.pirep.lat.to_string())
                        .param("lon", self.pirep.lon.to_string())
                        .param("degrees", self.pirep.degrees.to_string());
                }
            }
        }
        for station in chunk.stations() {
            req = req.param("station", station.clone());
        }
        req
    }
}

fn fmt_seconds(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn fmt_minutes(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%MZ").to_string()
}

/// Default request span per family, in years.
pub fn default_years(family: ReportFamily) -> u32 {
    match family {
        ReportFamily::Metar => 2,
        ReportFamily::Taf | ReportFamily::Pirep => 5,
    }
}

/// Default chunking per family.
pub fn default_policy(family: ReportFamily) -> ChunkingPolicy {
    match family {
        ReportFamily::Metar => ChunkingPolicy::default(),
        ReportFamily::Taf => ChunkingPolicy::DayWindows {
            window_days: 7,
            station_chunk_size: Some(25),
        },
        ReportFamily::Pirep => ChunkingPolicy::DayWindows {
            window_days: 30,
            station_chunk_size: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 8, 6, 30, 0).unwrap(),
        )
    }

    #[test]
    fn metar_request_repeats_station_params() {
        let spec = ArchiveSpec::new(ReportFamily::Metar);
        let chunk = ChunkDescriptor::StationGroup {
            stations: vec!["JFK".into(), "LGA".into()],
            window: window(),
        };
        let req = spec.request_for(&chunk);
        assert!(req.url.ends_with("/cgi-bin/request/asos.py"));
        assert_eq!(req.get("data"), Some("metar"));
        assert_eq!(req.get("sts"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(req.get("ets"), Some("2024-01-08T06:30:00Z"));
        let stations: Vec<&str> = req
            .query
            .iter()
            .filter(|(k, _)| k == "station")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(stations, vec!["JFK", "LGA"]);
    }

    #[test]
    fn taf_uses_minute_timestamps() {
        let req = ArchiveSpec::new(ReportFamily::Taf).request_for(&ChunkDescriptor::TimeSlice {
            window: window(),
        });
        assert_eq!(req.get("fmt"), Some("csv"));
        assert_eq!(req.get("sts"), Some("2024-01-01T00:00Z"));
        assert!(req.get("station").is_none());
    }

    #[test]
    fn pirep_filter_toggles_spatial_params() {
        let chunk = ChunkDescriptor::TimeSlice { window: window() };
        let filtered = ArchiveSpec::new(ReportFamily::Pirep).request_for(&chunk);
        assert_eq!(filtered.get("artcc"), Some("_ALL"));
        assert_eq!(filtered.get("filter"), Some("1"));
        assert_eq!(filtered.get("lat"), Some("39.5"));

        let open = ArchiveSpec::new(ReportFamily::Pirep)
            .with_pirep_filter(PirepFilter {
                enabled: false,
                ..PirepFilter::default()
            })
            .request_for(&chunk);
        assert!(open.get("filter").is_none());
        assert!(open.get("degrees").is_none());
    }

    #[test]
    fn unfiltered_pirep_windows_are_clamped() {
        let wide = ChunkingPolicy::DayWindows {
            window_days: 365,
            station_chunk_size: None,
        };
        let spec = ArchiveSpec::new(ReportFamily::Pirep);
        assert_eq!(spec.effective_policy(&wide), wide);
        let open = spec.with_pirep_filter(PirepFilter {
            enabled: false,
            ..PirepFilter::default()
        });
        assert_eq!(
            open.effective_policy(&wide),
            ChunkingPolicy::DayWindows {
                window_days: UNFILTERED_PIREP_MAX_DAYS,
                station_chunk_size: None
            }
        );
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let spec = ArchiveSpec::new(ReportFamily::Metar).with_base_url("http://127.0.0.1:9/");
        assert_eq!(spec.endpoint(), "http://127.0.0.1:9/cgi-bin/request/asos.py");
    }
}
