// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use econ_calendar_proxy::cache::MemoryCache;
use econ_calendar_proxy::error::UpstreamError;
use econ_calendar_proxy::query::CalendarQuery;
use econ_calendar_proxy::sources::{RawPayload, SourceAdapter};
use econ_calendar_proxy::{create_router, AppState, FallbackOrchestrator};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

const BODY_LIMIT: usize = 1024 * 1024;
const SECRET: &str = "cron-test-secret";

struct FixtureSource;

#[async_trait]
impl SourceAdapter for FixtureSource {
    async fn fetch_raw(&self, _q: &CalendarQuery) -> Result<RawPayload, UpstreamError> {
        Ok(RawPayload::Html(
            include_str!("fixtures/calendar_fragment.html").to_string(),
        ))
    }
    fn name(&self) -> &str {
        "investing.com"
    }
}

struct DownSource;

#[async_trait]
impl SourceAdapter for DownSource {
    async fn fetch_raw(&self, _q: &CalendarQuery) -> Result<RawPayload, UpstreamError> {
        Err(UpstreamError::Http {
            status: 502,
            body_preview: String::new(),
        })
    }
    fn name(&self) -> &str {
        "down"
    }
}

fn router_with(sources: Vec<Box<dyn SourceAdapter>>) -> Router {
    let orch = FallbackOrchestrator::new(
        sources,
        Some(Arc::new(MemoryCache::new())),
        Duration::from_secs(60),
    );
    create_router(AppState::new(Arc::new(orch), Some(SECRET.to_string())))
}

fn test_router() -> Router {
    router_with(vec![Box::new(DownSource), Box::new(FixtureSource)])
}

async fn get(app: &Router, uri: &str, auth: Option<&str>) -> (StatusCode, http::HeaderMap, Json) {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(a) = auth {
        req = req.header("authorization", a);
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::empty()).expect("build request"))
        .await
        .expect("router response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, headers, v)
}

#[tokio::test]
async fn api_health_returns_ok() {
    let app = test_router();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn api_calendar_returns_envelope_and_cache_headers() {
    let app = test_router();
    let uri = "/api/calendar?from=2026-01-05&to=2026-01-07&countries=5,4&importance=2,3";

    let (status, headers, v) = get(&app, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-calendar-cache").unwrap(), "MISS");
    assert!(headers
        .get("cache-control")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("s-maxage=300"));

    assert_eq!(v["status"], "success");
    assert_eq!(v["metadata"]["source"], "investing.com");
    assert_eq!(v["metadata"]["total_events"], 4);
    assert_eq!(v["metadata"]["query_parameters"]["countries"], serde_json::json!(["5", "4"]));
    assert_eq!(v["data"]["summary"]["by_importance"]["high"], 1);
    let first_day = v["data"]["events_by_date"]
        .as_object()
        .unwrap()
        .keys()
        .next()
        .cloned();
    assert_eq!(first_day.as_deref(), Some("Monday, January 5, 2026"));

    let (status2, headers2, _) = get(&app, uri, None).await;
    assert_eq!(status2, StatusCode::OK);
    assert_eq!(headers2.get("x-calendar-cache").unwrap(), "HIT");
}

#[tokio::test]
async fn api_calendar_rejects_bad_query() {
    let app = test_router();
    let (status, _, v) = get(&app, "/api/calendar?importance=0,5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["status"], "error");
}

#[tokio::test]
async fn api_calendar_degrades_instead_of_failing() {
    let app = router_with(vec![Box::new(DownSource)]);
    let (status, headers, v) = get(&app, "/api/calendar", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["metadata"]["source"], "unavailable");
    assert_eq!(v["metadata"]["total_events"], 0);
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    assert_eq!(headers.get("x-calendar-cache").unwrap(), "MISS");
}

#[tokio::test]
async fn api_calendar_window_defaults_to_today_plus_seven() {
    let app = test_router();
    let (status, _, v) = get(&app, "/api/calendar?from=2020-01-01", None).await;
    assert_eq!(status, StatusCode::OK);
    let to = v["metadata"]["query_parameters"]["date_to"].as_str().unwrap();
    let expected = (chrono::Utc::now().date_naive() + chrono::Duration::days(7))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(to, expected);
}

#[tokio::test]
async fn api_calendar_rejects_out_of_range_year() {
    let app = test_router();
    let (status, _, v) = get(&app, "/api/calendar?from=%2B262142-12-30", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["status"], "error");
}

#[tokio::test]
async fn api_sync_requires_bearer_secret() {
    let app = test_router();
    let (status, _, v) = get(&app, "/api/sync-calendar", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "Unauthorized");

    let (status, _, _) = get(&app, "/api/sync-calendar", Some("Bearer wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, v) = get(&app, "/api/sync-calendar", Some(&format!("Bearer {SECRET}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "success");
    assert_eq!(v["source"], "investing.com");
    assert_eq!(v["events"], 4);
}

#[tokio::test]
async fn api_sync_warms_cache_for_default_window() {
    let app = test_router();
    let (status, _, _) = get(&app, "/api/sync-calendar", Some(&format!("Bearer {SECRET}"))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, headers, _) = get(&app, "/api/calendar", None).await;
    assert_eq!(headers.get("x-calendar-cache").unwrap(), "HIT");
}

#[tokio::test]
async fn api_sync_reports_failure_when_all_sources_fail() {
    let app = router_with(vec![Box::new(DownSource)]);
    let (status, _, v) = get(&app, "/api/sync-calendar", Some(&format!("Bearer {SECRET}"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(v["status"], "error");
}
