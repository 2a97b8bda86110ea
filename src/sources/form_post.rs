// src/sources/form_post.rs
use async_trait::async_trait;
use serde::Deserialize;

use super::{looks_like_challenge, send_checked, RawPayload, SourceAdapter};
use crate::error::{preview, UpstreamError};
use crate::query::CalendarQuery;

/// Default upstream time zone id sent with the form (GMT).
const DEFAULT_TIME_ZONE: &str = "8";

/// POSTs the query as an urlencoded form. The endpoint answers with a JSON
/// envelope whose `data` field holds the calendar HTML fragment.
pub struct FormPostSource {
    name: String,
    url: String,
    time_zone: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl FormPostSource {
    pub fn new(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            client,
        }
    }

    pub fn with_time_zone(mut self, tz: Option<String>) -> Self {
        if let Some(tz) = tz.filter(|t| !t.trim().is_empty()) {
            self.time_zone = tz;
        }
        self
    }

    fn form(&self, q: &CalendarQuery) -> Vec<(&'static str, String)> {
        vec![
            ("dateFrom", q.date_from_str()),
            ("dateTo", q.date_to_str()),
            ("country", q.countries_csv()),
            ("importance", q.importance_csv()),
            ("timeZone", self.time_zone.clone()),
            ("timeFilter", "timeRemain".to_string()),
            ("currentTab", "custom".to_string()),
        ]
    }

    /// Origin of the endpoint, used for `Origin` / `Referer`.
    fn origin(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(u) => u.origin().ascii_serialization(),
            Err(_) => String::new(),
        }
    }
}

/// Pull the HTML fragment out of the `{ "data": "<tr ..." }` envelope.
pub(crate) fn unwrap_envelope(body: &str) -> Result<String, UpstreamError> {
    if looks_like_challenge(body) {
        return Err(UpstreamError::Challenge {
            body_preview: preview(body),
        });
    }
    let env: Envelope = serde_json::from_str(body)
        .map_err(|e| UpstreamError::malformed(format!("envelope is not JSON: {e}"), body))?;
    match env.data {
        Some(serde_json::Value::String(html)) => Ok(html),
        Some(_) => Err(UpstreamError::malformed("envelope `data` is not a string", body)),
        None => Err(UpstreamError::malformed("envelope has no `data` field", body)),
    }
}

#[async_trait]
impl SourceAdapter for FormPostSource {
    async fn fetch_raw(&self, query: &CalendarQuery) -> Result<RawPayload, UpstreamError> {
        let origin = self.origin();
        let req = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Origin", origin.as_str())
            .header("Referer", format!("{origin}/economic-calendar/"))
            .form(&self.form(query));

        let body = send_checked(req).await?;
        let html = unwrap_envelope(&body)?;
        tracing::debug!(
            target: "calendar",
            source = %self.name,
            bytes = html.len(),
            "form source returned html fragment"
        );
        Ok(RawPayload::Html(html))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_data_string() {
        let html = unwrap_envelope(r#"{"data":"<tr id=\"eventRowId_1\">","pids":[]}"#).unwrap();
        assert_eq!(html, r#"<tr id="eventRowId_1">"#);
    }

    #[test]
    fn envelope_without_data_is_malformed() {
        let err = unwrap_envelope(r#"{"error":"nope"}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed");
        let err = unwrap_envelope(r#"{"data":42}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed");
        let err = unwrap_envelope("plain text").unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn challenge_page_instead_of_envelope() {
        let err = unwrap_envelope("<!DOCTYPE html><html><script src=\"/cdn-cgi/challenge.js\"></script>")
            .unwrap_err();
        assert_eq!(err.kind(), "challenge");
        assert!(err.body_preview().starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn form_carries_query_and_fixed_fields() {
        let src = FormPostSource::new("investing.com", "https://example.test/x", reqwest::Client::new())
            .with_time_zone(Some("55".into()));
        let q = CalendarQuery::default_for(chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        let form = src.form(&q);
        assert!(form.contains(&("dateFrom", "2026-01-05".to_string())));
        assert!(form.contains(&("country", "32,37,25,72,6,22,17,39,14".to_string())));
        assert!(form.contains(&("timeZone", "55".to_string())));
        assert!(form.contains(&("currentTab", "custom".to_string())));
        assert_eq!(src.origin(), "https://example.test");
    }
}
