use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::orchestrator::FallbackOrchestrator;
use crate::query::CalendarQuery;
use crate::scheduler::refresh_default_window;

/// Diagnostics header: `HIT` when served from cache, else `MISS`.
pub const CACHE_HEADER: &str = "x-calendar-cache";
const CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=600";
const NO_STORE: &str = "no-store";

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<FallbackOrchestrator>,
    cron_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>, cron_secret: Option<String>) -> Self {
        Self {
            orchestrator,
            cron_secret: cron_secret.map(Arc::from),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/calendar", get(calendar))
        .route("/api/sync-calendar", get(sync_calendar).post(sync_calendar))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn calendar(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let today = chrono::Utc::now().date_naive();
    let query = match CalendarQuery::from_params(&params, today) {
        Ok(q) => q,
        Err(e) => {
            tracing::debug!(target: "calendar", error = %e, "rejected calendar query");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let outcome = state.orchestrator.fetch(&query).await;
    // Degraded envelopes must not be held by shared caches either.
    let cache_control = if outcome.result.is_degraded() {
        NO_STORE
    } else {
        CACHE_CONTROL
    };

    let mut resp = Json(outcome.result).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert(
        CACHE_HEADER,
        HeaderValue::from_static(if outcome.cache_hit { "HIT" } else { "MISS" }),
    );
    resp
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    // No configured secret means the endpoint is closed.
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| digest_eq(token, secret))
}

/// Compare fixed-size digests without early exit so timing does not leak the secret.
fn digest_eq(a: &str, b: &str) -> bool {
    use sha2::{Digest, Sha256};
    let (da, db) = (Sha256::digest(a.as_bytes()), Sha256::digest(b.as_bytes()));
    da.iter().zip(db.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn sync_calendar(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, state.cron_secret.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let result = refresh_default_window(&state.orchestrator).await;
    if result.is_degraded() {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "status": "error",
                "error": "Sync failed",
                "details": "all calendar sources failed",
            })),
        )
            .into_response();
    }

    Json(json!({
        "status": "success",
        "message": "Calendar data synced",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "source": result.metadata.source,
        "events": result.metadata.total_events,
        "days": result.metadata.total_days,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_matching() {
        let mut h = HeaderMap::new();
        assert!(!authorized(&h, Some("s3cret")));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(authorized(&h, Some("s3cret")));
        assert!(!authorized(&h, Some("other")));
        assert!(!authorized(&h, None));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(!authorized(&h, Some("s3cret")));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cre"));
        assert!(!authorized(&h, Some("s3cret")));
    }

    #[test]
    fn digest_comparison() {
        assert!(digest_eq("abc", "abc"));
        assert!(!digest_eq("abc", "abd"));
        assert!(!digest_eq("", "abc"));
    }
}
