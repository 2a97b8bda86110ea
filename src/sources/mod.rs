// src/sources/mod.rs
//! Upstream calendar sources behind a uniform `fetch_raw` contract.

pub mod direct_json;
pub mod form_post;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{SourceConfig, SourceKind};
use crate::error::{preview, UpstreamError};
use crate::query::CalendarQuery;

pub use direct_json::DirectJsonSource;
pub use form_post::FormPostSource;

/// Raw payload of one successful source attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Server-rendered HTML fragment; needs the markup extractor.
    Html(String),
    /// Pre-structured JSON envelope.
    Json(serde_json::Value),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_raw(&self, query: &CalendarQuery) -> Result<RawPayload, UpstreamError>;
    /// Reported as `metadata.source` when this adapter wins.
    fn name(&self) -> &str;
}

/// Browser-ish UA; the form endpoint rejects obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// reqwest client with a bounded connect + total timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Build adapters from config, in priority order.
pub fn build_sources(
    configs: &[SourceConfig],
    timeout: Duration,
) -> Result<Vec<Box<dyn SourceAdapter>>, reqwest::Error> {
    let client = build_http_client(timeout)?;
    let sources = configs
        .iter()
        .map(|c| -> Box<dyn SourceAdapter> {
            match c.kind {
                SourceKind::FormPost => Box::new(
                    FormPostSource::new(&c.name, &c.url, client.clone())
                        .with_time_zone(c.time_zone.clone()),
                ),
                SourceKind::DirectJson => {
                    Box::new(DirectJsonSource::new(&c.name, &c.url, client.clone()))
                }
            }
        })
        .collect();
    Ok(sources)
}

/// Document markers of an anti-bot interstitial served instead of data.
const CHALLENGE_MARKERS: [&str; 3] = ["<!doctype", "<html", "<script"];

pub(crate) fn looks_like_challenge(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(16).collect::<String>().to_ascii_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| head.starts_with(m))
}

/// Send, reject non-2xx without parsing, and return the body text.
pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<String, UpstreamError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = read_prefix(resp, ERROR_BODY_LIMIT).await;
        return Err(UpstreamError::Http {
            status: status.as_u16(),
            body_preview: preview(&body),
        });
    }
    Ok(resp.text().await?)
}

/// Bytes of an error body read for diagnostics; the rest is never buffered.
const ERROR_BODY_LIMIT: usize = 4 * 1024;

/// Read at most `limit` bytes of the body. Read errors end the prefix early.
async fn read_prefix(mut resp: reqwest::Response, limit: usize) -> String {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < limit {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
