// src/sources/direct_json.rs
use async_trait::async_trait;

use super::{looks_like_challenge, send_checked, RawPayload, SourceAdapter};
use crate::error::{preview, UpstreamError};
use crate::query::CalendarQuery;

/// GETs an endpoint that already serves the final structured JSON.
pub struct DirectJsonSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl DirectJsonSource {
    pub fn new(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        }
    }
}

/// Classify a 2xx body: challenge page, malformed JSON, or data.
pub(crate) fn classify_body(body: &str) -> Result<serde_json::Value, UpstreamError> {
    if looks_like_challenge(body) {
        return Err(UpstreamError::Challenge {
            body_preview: preview(body),
        });
    }
    serde_json::from_str(body)
        .map_err(|e| UpstreamError::malformed(format!("invalid JSON: {e}"), body))
}

#[async_trait]
impl SourceAdapter for DirectJsonSource {
    async fn fetch_raw(&self, query: &CalendarQuery) -> Result<RawPayload, UpstreamError> {
        let req = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .query(&[
                ("format", "json".to_string()),
                ("from", query.date_from_str()),
                ("to", query.date_to_str()),
                ("countries", query.countries_csv()),
                ("importance", query.importance_csv()),
            ]);

        let body = send_checked(req).await?;
        classify_body(&body).map(RawPayload::Json)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_markers_are_case_insensitive() {
        assert!(looks_like_challenge("  <!DOCTYPE html><html>"));
        assert!(looks_like_challenge("<HTML><body>aes.js</body>"));
        assert!(looks_like_challenge("\n<script>document.cookie=...</script>"));
        assert!(!looks_like_challenge(r#"{"status":"success"}"#));
    }

    #[test]
    fn challenge_and_malformed_are_distinct() {
        let e = classify_body("<html><script src=\"/aes.js\"></script></html>").unwrap_err();
        assert_eq!(e.kind(), "challenge");
        let e = classify_body("{\"status\":").unwrap_err();
        assert_eq!(e.kind(), "malformed");
        assert!(classify_body(r#"{"data":{}}"#).is_ok());
    }
}
