// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod scheduler;
pub mod sources;
pub mod summary;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::extract::extract;
pub use crate::model::{CalendarResult, DayBucket, EventRecord};
pub use crate::orchestrator::{FallbackOrchestrator, FetchOutcome};
pub use crate::summary::summarize;

use std::sync::Arc;

use axum::Router;

use crate::config::CalendarConfig;

/// Build the full router from config: orchestrator, sync endpoint, and
/// (when `metrics` is given) the `/metrics` route.
pub fn app(
    cfg: &CalendarConfig,
    metrics: Option<&crate::metrics::Metrics>,
) -> anyhow::Result<(Router, Arc<FallbackOrchestrator>)> {
    let orchestrator = Arc::new(cfg.build_orchestrator()?);
    let state = AppState::new(orchestrator.clone(), cfg.cron_secret.clone());
    let mut router = create_router(state);
    if let Some(m) = metrics {
        router = router.merge(m.router());
    }
    Ok((router, orchestrator))
}
