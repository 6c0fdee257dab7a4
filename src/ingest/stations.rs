// src/ingest/stations.rs
//! CONUS ASOS station list from the per-state GeoJSON networks.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::ingest::error::FetchError;
use crate::ingest::types::{ArchiveRequest, ArchiveTransport};

pub const CONUS_STATES: &[&str] = &[
    "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "IA", "ID", "IL", "IN", "KS", "KY",
    "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE", "NH", "NJ", "NM", "NV",
    "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VA", "VT", "WA", "WI", "WV",
    "WY",
];

const LAT_RANGE: (f64, f64) = (24.0, 50.0);
const LON_RANGE: (f64, f64) = (-125.0, -66.0);

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<f64>,
}

pub fn in_conus(lat: f64, lon: f64) -> bool {
    (LAT_RANGE.0..=LAT_RANGE.1).contains(&lat) && (LON_RANGE.0..=LON_RANGE.1).contains(&lon)
}

/// Station ids inside the CONUS box from one GeoJSON document.
pub fn parse_network(body: &[u8]) -> serde_json::Result<Vec<String>> {
    let doc: FeatureCollection = serde_json::from_slice(body)?;
    let mut out = Vec::new();
    for f in doc.features {
        let id = ["id", "sid", "station"]
            .iter()
            .find_map(|k| f.properties.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(id) = id else { continue };
        let Some(geom) = f.geometry else { continue };
        if let &[lon, lat, ..] = geom.coordinates.as_slice() {
            if in_conus(lat, lon) {
                out.push(id.to_string());
            }
        }
    }
    Ok(out)
}

pub fn network_request(base_url: &str, state: &str) -> ArchiveRequest {
    ArchiveRequest::new(format!("{}/geojson/network.py", base_url.trim_end_matches('/')))
        .param("network", format!("{state}_ASOS"))
}

async fn fetch_body(
    transport: &dyn ArchiveTransport,
    request: &ArchiveRequest,
) -> Result<Vec<u8>, FetchError> {
    let mut stream = transport.open(request).await?;
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

/// Sorted, de-duplicated CONUS station ids. Networks that fail to download or
/// parse are logged and skipped.
pub async fn conus_stations(
    transport: &dyn ArchiveTransport,
    base_url: &str,
    states: &[&str],
) -> Vec<String> {
    let mut all = BTreeSet::new();
    for state in states {
        let req = network_request(base_url, state);
        let body = match fetch_body(transport, &req).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(target: "ingest", state, error = %e, "station network fetch failed");
                continue;
            }
        };
        match parse_network(&body) {
            Ok(ids) => {
                tracing::debug!(target: "ingest", state, count = ids.len(), "station network loaded");
                all.extend(ids);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", state, error = %e, "station network unreadable");
            }
        }
    }
    tracing::info!(target: "ingest", stations = all.len(), "CONUS station list ready");
    all.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"properties": {"id": "JFK"}, "geometry": {"coordinates": [-73.78, 40.64]}},
            {"properties": {"sid": "ANC"}, "geometry": {"coordinates": [-149.99, 61.17]}},
            {"properties": {"station": " BOS "}, "geometry": {"coordinates": [-71.0, 42.36]}},
            {"properties": {"name": "nameless"}, "geometry": {"coordinates": [-90.0, 35.0]}},
            {"properties": {"id": "NOGEO"}, "geometry": null},
            {"properties": {"id": "HNL"}, "geometry": {"coordinates": [-157.9, 21.3]}}
        ]
    }"#;

    #[test]
    fn keeps_ids_inside_the_box() {
        assert_eq!(parse_network(DOC.as_bytes()).unwrap(), vec!["JFK", "BOS"]);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(parse_network(b"<html>").is_err());
    }

    #[test]
    fn request_names_the_state_network() {
        let r = network_request("https://example.test/", "NY");
        assert_eq!(r.url, "https://example.test/geojson/network.py");
        assert_eq!(r.get("network"), Some("NY_ASOS"));
    }
}
