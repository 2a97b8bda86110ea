//! Error types at the upstream / cache / query seams.

use chrono::NaiveDate;
use thiserror::Error;

/// Max characters of an upstream body kept for diagnostics.
pub const BODY_PREVIEW_CHARS: usize = 200;

/// Failure of a single source attempt. Never escapes the orchestrator; it only
/// drives the fallback to the next source.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-2xx status. The body is not parsed.
    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body_preview: String },

    /// Anti-bot / challenge page (HTML document) where data was expected.
    #[error("upstream returned a challenge document instead of data")]
    Challenge { body_preview: String },

    /// Body is neither the expected structured data nor usable markup.
    #[error("malformed upstream response: {reason}")]
    Malformed { reason: String, body_preview: String },

    /// Connect failure, timeout, or body read error.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Stable label for logs and metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Http { .. } => "http",
            UpstreamError::Challenge { .. } => "challenge",
            UpstreamError::Malformed { .. } => "malformed",
            UpstreamError::Transport(e) if e.is_timeout() => "timeout",
            UpstreamError::Transport(_) => "transport",
        }
    }

    pub fn body_preview(&self) -> &str {
        match self {
            UpstreamError::Http { body_preview, .. }
            | UpstreamError::Challenge { body_preview }
            | UpstreamError::Malformed { body_preview, .. } => body_preview,
            UpstreamError::Transport(_) => "",
        }
    }

    pub fn malformed(reason: impl Into<String>, body: &str) -> Self {
        UpstreamError::Malformed {
            reason: reason.into(),
            body_preview: preview(body),
        }
    }
}

/// Cache backend failure. Non-fatal: logged and swallowed by callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Rejected inbound query parameter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid `{param}` date '{value}', expected YYYY-MM-DD")]
    InvalidDate { param: &'static str, value: String },
    #[error("`from` ({from}) is after `to` ({to})")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error("invalid countries list '{0}', expected comma-separated numeric codes")]
    InvalidCountries(String),
    #[error("invalid importance list '{0}', expected a subset of 1,2,3")]
    InvalidImportance(String),
}

/// First `BODY_PREVIEW_CHARS` chars, whitespace collapsed.
pub fn preview(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect()
}
