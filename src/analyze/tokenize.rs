//! Per-family tokenization: whitespace split plus header stripping.

use serde::{Deserialize, Serialize};

/// Which kind of aviation text report a string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFamily {
    /// Routine/special observations (METAR/SPECI).
    Metar,
    /// Terminal aerodrome forecasts.
    Taf,
    /// Pilot reports.
    Pirep,
}

impl ReportFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFamily::Metar => "metar",
            ReportFamily::Taf => "taf",
            ReportFamily::Pirep => "pirep",
        }
    }

    /// Only observations carry a per-token difficulty table.
    pub fn uses_difficulty(self) -> bool {
        matches!(self, ReportFamily::Metar)
    }

    pub fn tokenize(self, raw: &str) -> Vec<&str> {
        match self {
            ReportFamily::Metar => tokenize_metar(raw),
            ReportFamily::Taf => tokenize_taf(raw),
            ReportFamily::Pirep => tokenize_pirep(raw),
        }
    }
}

impl std::str::FromStr for ReportFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metar" => Ok(ReportFamily::Metar),
            "taf" => Ok(ReportFamily::Taf),
            "pirep" => Ok(ReportFamily::Pirep),
            other => anyhow::bail!("unknown report family: {other}"),
        }
    }
}

/// `METAR KJFK 121851Z 27015KT ...` -> `27015KT ...`. `SPECI` is kept: it is
/// itself a signal.
pub fn tokenize_metar(raw: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.first() == Some(&"METAR") {
        parts.remove(0);
    }
    strip_station_and_time(&mut parts);
    parts.retain(|p| *p != "METAR");
    parts
}

/// Drops `TAF`/`TAFAMD`/... and the station + issue time group.
pub fn tokenize_taf(raw: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.first().is_some_and(|p| p.starts_with("TAF")) {
        parts.remove(0);
    }
    strip_station_and_time(&mut parts);
    parts
}

/// No header conventions worth stripping in free-form pilot reports.
pub fn tokenize_pirep(raw: &str) -> Vec<&str> {
    raw.split_whitespace().collect()
}

fn strip_station_and_time(parts: &mut Vec<&str>) {
    if parts.len() >= 2 && is_station_id(parts[0]) && is_zulu_time(parts[1]) {
        parts.drain(..2);
    }
}

fn is_station_id(tok: &str) -> bool {
    !tok.is_empty() && tok.chars().all(char::is_alphabetic)
}

fn is_zulu_time(tok: &str) -> bool {
    tok.strip_suffix('Z')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}
