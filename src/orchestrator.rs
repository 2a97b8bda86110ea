//! # Fallback Orchestrator
//! Decides which upstream to trust for one calendar request.
//!
//! Order: unexpired cache entry → sources in priority order → degraded empty
//! envelope. A source failure only advances the chain; callers always receive
//! a well-formed `CalendarResult`.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::cache::CacheStore;
use crate::error::UpstreamError;
use crate::extract::extract;
use crate::model::{CalendarResult, DayBucket};
use crate::query::CalendarQuery;
use crate::sources::{RawPayload, SourceAdapter};

/// Default lifetime of a cached calendar window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("calendar_requests_total", "Calendar fetches handled.");
        describe_counter!("calendar_cache_hits_total", "Fetches answered from cache.");
        describe_counter!(
            "calendar_source_errors_total",
            "Failed source attempts, by source and error kind."
        );
        describe_counter!(
            "calendar_cache_errors_total",
            "Cache read/write failures (non-fatal)."
        );
        describe_counter!(
            "calendar_degraded_total",
            "Fetches where every source failed."
        );
        describe_counter!(
            "calendar_extracted_events_total",
            "Events extracted from upstream markup."
        );
        describe_histogram!("calendar_extract_ms", "Markup extraction time in milliseconds.");
    });
}

/// Result plus where it came from, for diagnostics headers.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: CalendarResult,
    pub cache_hit: bool,
}

pub struct FallbackOrchestrator {
    sources: Vec<Box<dyn SourceAdapter>>,
    cache: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl FallbackOrchestrator {
    pub fn new(
        sources: Vec<Box<dyn SourceAdapter>>,
        cache: Option<Arc<dyn CacheStore>>,
        ttl: Duration,
    ) -> Self {
        Self { sources, cache, ttl }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Serve a request: cache first, then the source chain.
    pub async fn fetch(&self, query: &CalendarQuery) -> FetchOutcome {
        ensure_metrics_described();
        counter!("calendar_requests_total").increment(1);

        let key = query.cache_key();
        if let Some(hit) = self.read_cache(&key).await {
            counter!("calendar_cache_hits_total").increment(1);
            tracing::debug!(target: "calendar", %key, source = %hit.metadata.source, "cache hit");
            return FetchOutcome {
                result: hit,
                cache_hit: true,
            };
        }

        FetchOutcome {
            result: self.run_chain(query, &key).await,
            cache_hit: false,
        }
    }

    /// Scheduled refresh: skip the cache read, always hit sources, overwrite the entry.
    pub async fn refresh(&self, query: &CalendarQuery) -> CalendarResult {
        ensure_metrics_described();
        let key = query.cache_key();
        let result = self.run_chain(query, &key).await;
        tracing::info!(
            target: "calendar",
            %key,
            source = %result.metadata.source,
            total_events = result.metadata.total_events,
            "calendar refresh finished"
        );
        result
    }

    async fn run_chain(&self, query: &CalendarQuery, key: &str) -> CalendarResult {
        for source in &self.sources {
            let name = source.name();
            let attempt = source
                .fetch_raw(query)
                .await
                .and_then(events_from_payload);

            match attempt {
                Ok(events) => {
                    let result = CalendarResult::build(name, events, query, chrono::Utc::now());
                    tracing::info!(
                        target: "calendar",
                        source = name,
                        total_events = result.metadata.total_events,
                        total_days = result.metadata.total_days,
                        "source succeeded"
                    );
                    self.write_cache(key, &result).await;
                    return result;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "calendar",
                        source = name,
                        kind = e.kind(),
                        error = %e,
                        body_preview = e.body_preview(),
                        "source failed, trying next"
                    );
                    counter!(
                        "calendar_source_errors_total",
                        "source" => name.to_string(),
                        "kind" => e.kind()
                    )
                    .increment(1);
                }
            }
        }

        counter!("calendar_degraded_total").increment(1);
        tracing::error!(
            target: "calendar",
            sources = self.sources.len(),
            "all calendar sources failed, serving degraded result"
        );
        CalendarResult::degraded(query, chrono::Utc::now())
    }

    async fn read_cache(&self, key: &str) -> Option<CalendarResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CalendarResult>(&raw) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!(target: "calendar", %key, error = %e, "ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                counter!("calendar_cache_errors_total").increment(1);
                tracing::warn!(
                    target: "calendar",
                    backend = cache.backend_name(),
                    error = %e,
                    "cache read failed"
                );
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, result: &CalendarResult) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(result) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "calendar", error = %e, "cannot serialize result for cache");
                return;
            }
        };
        if let Err(e) = cache.set(key, &raw, self.ttl).await {
            counter!("calendar_cache_errors_total").increment(1);
            tracing::warn!(
                target: "calendar",
                backend = cache.backend_name(),
                error = %e,
                "cache write failed"
            );
        }
    }
}

/// HTML goes through the extractor; JSON is read as an envelope.
pub fn events_from_payload(raw: RawPayload) -> Result<DayBucket, UpstreamError> {
    match raw {
        RawPayload::Html(html) => Ok(extract(&html)),
        RawPayload::Json(v) => events_from_json(&v),
    }
}

/// Read `data.events_by_date` (or a top-level `events_by_date`) from a
/// structured payload, dropping records that break the model invariants.
pub fn events_from_json(v: &Value) -> Result<DayBucket, UpstreamError> {
    let body = || v.to_string();

    if v.get("status").and_then(Value::as_str) == Some("error") {
        return Err(UpstreamError::malformed(
            "upstream envelope reports error status",
            &body(),
        ));
    }

    let events = v
        .pointer("/data/events_by_date")
        .or_else(|| v.get("events_by_date"))
        .ok_or_else(|| UpstreamError::malformed("no events_by_date in payload", &body()))?;

    let mut bucket: DayBucket = serde_json::from_value(events.clone())
        .map_err(|e| UpstreamError::malformed(format!("events_by_date: {e}"), &body()))?;

    let dropped = bucket.retain_well_formed();
    if dropped > 0 {
        tracing::warn!(target: "calendar", dropped, "dropped malformed records from JSON payload");
    }
    Ok(bucket)
}
