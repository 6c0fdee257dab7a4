// src/ingest/plan.rs
//! Splitting a training run into bounded archive requests.

use chrono::Duration;
use serde::Deserialize;

use crate::ingest::types::{ChunkDescriptor, TimeWindow};

pub const DEFAULT_MAX_STATION_YEARS: f64 = 1000.0;

/// How the request space is partitioned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChunkingPolicy {
    /// Station groups over the whole window with
    /// `stations_in_group * years <= max_station_years`.
    StationYears { max_station_years: f64 },
    /// Fixed day windows in order; inside each window stations (if any) are
    /// grouped by `station_chunk_size`.
    DayWindows {
        window_days: u32,
        #[serde(default)]
        station_chunk_size: Option<usize>,
    },
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        ChunkingPolicy::StationYears {
            max_station_years: DEFAULT_MAX_STATION_YEARS,
        }
    }
}

/// Build the full, ordered chunk list for a run.
pub fn plan_chunks(
    window: &TimeWindow,
    stations: &[String],
    policy: &ChunkingPolicy,
) -> Vec<ChunkDescriptor> {
    match policy {
        ChunkingPolicy::StationYears { max_station_years } => {
            let per_chunk = stations_per_chunk(window.years(), *max_station_years);
            stations
                .chunks(per_chunk)
                .map(|group| ChunkDescriptor::StationGroup {
                    stations: group.to_vec(),
                    window: *window,
                })
                .collect()
        }
        ChunkingPolicy::DayWindows {
            window_days,
            station_chunk_size,
        } => {
            let mut out = Vec::new();
            for slice in day_windows(window, *window_days) {
                match station_chunk_size {
                    Some(size) if !stations.is_empty() => {
                        out.extend(stations.chunks((*size).max(1)).map(|group| {
                            ChunkDescriptor::StationGroup {
                                stations: group.to_vec(),
                                window: slice,
                            }
                        }))
                    }
                    _ => out.push(ChunkDescriptor::TimeSlice { window: slice }),
                }
            }
            out
        }
    }
}

/// `max(1, floor(budget / years))`; a zero-length window fits everything.
pub fn stations_per_chunk(years: f64, max_station_years: f64) -> usize {
    if years <= 0.0 || !years.is_finite() {
        return usize::MAX;
    }
    ((max_station_years / years).floor() as usize).max(1)
}

/// Consecutive `[cur, min(cur + days, end))` slices covering `window`.
pub fn day_windows(window: &TimeWindow, days: u32) -> Vec<TimeWindow> {
    let step = Duration::days(i64::from(days.max(1)));
    let mut out = Vec::new();
    let mut cur = window.start;
    while cur < window.end {
        let next = (cur + step).min(window.end);
        out.push(TimeWindow::new(cur, next));
        cur = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn two_years() -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TimeWindow::trailing_years(end, 2)
    }

    fn stations(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("K{i:03}")).collect()
    }

    #[test]
    fn station_years_budget_bounds_groups() {
        let chunks = plan_chunks(
            &two_years(),
            &stations(1201),
            &ChunkingPolicy::StationYears {
                max_station_years: 1000.0,
            },
        );
        // 1000 / 2 years = 500 stations per request
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].stations().len(), 500);
        assert_eq!(chunks[2].stations().len(), 201);
        assert!(chunks.iter().all(|c| c.window() == &two_years()));
    }

    #[test]
    fn tiny_budget_still_makes_progress() {
        assert_eq!(stations_per_chunk(5.0, 1.0), 1);
        assert_eq!(stations_per_chunk(0.0, 1.0), usize::MAX);
    }

    #[test]
    fn day_windows_cover_the_range_without_gaps() {
        let w = two_years();
        let slices = day_windows(&w, 30);
        assert_eq!(slices.first().unwrap().start, w.start);
        assert_eq!(slices.last().unwrap().end, w.end);
        for pair in slices.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        // 730 days / 30 = 24 full + 1 partial
        assert_eq!(slices.len(), 25);
    }

    #[test]
    fn day_windows_with_station_groups() {
        let chunks = plan_chunks(
            &two_years(),
            &stations(60),
            &ChunkingPolicy::DayWindows {
                window_days: 365,
                station_chunk_size: Some(25),
            },
        );
        // 2 windows x ceil(60/25)=3 groups, window-major order
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks[0].window(), chunks[2].window());
        assert_ne!(chunks[2].window(), chunks[3].window());
        assert_eq!(chunks[2].stations().len(), 10);
    }

    #[test]
    fn day_windows_without_stations_are_time_slices() {
        let chunks = plan_chunks(
            &two_years(),
            &[],
            &ChunkingPolicy::DayWindows {
                window_days: 120,
                station_chunk_size: None,
            },
        );
        assert_eq!(chunks.len(), 7);
        assert!(matches!(chunks[0], ChunkDescriptor::TimeSlice { .. }));
    }
}
