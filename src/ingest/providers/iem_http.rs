// src/ingest/providers/iem_http.rs
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::error::FetchError;
use crate::ingest::types::{ArchiveRequest, ArchiveTransport, ByteStream};

/// Client settings for archive downloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    pub connect_timeout_secs: u64,
    /// Max silence between body reads; large archive responses stream for minutes.
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            read_timeout_secs: 120,
            user_agent: concat!("metar-rarity/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Streams archive responses over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(cfg: &HttpTransportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .read_timeout(Duration::from_secs(cfg.read_timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveTransport for HttpTransport {
    async fn open(&self, request: &ArchiveRequest) -> Result<ByteStream, FetchError> {
        let resp = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(target: "ingest", url = %request.url, status = status.as_u16(), "archive answered non-success");
            return Err(FetchError::from_status(status.as_u16()));
        }

        Ok(resp.bytes_stream().map_err(FetchError::from).boxed())
    }

    fn name(&self) -> &'static str {
        "iem-http"
    }
}
