// src/ingest/providers/mod.rs
pub mod iem_http;

pub use iem_http::{HttpTransport, HttpTransportConfig};
