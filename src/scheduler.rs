// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::orchestrator::FallbackOrchestrator;
use crate::query::CalendarQuery;

/// Spawn a periodic refresh of the default calendar window (today .. today+7).
/// The first tick fires immediately so the cache is warm after startup.
pub fn spawn_refresh_scheduler(
    orchestrator: Arc<FallbackOrchestrator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            refresh_default_window(&orchestrator).await;
        }
    })
}

/// One refresh of the default window. Shared by the scheduler and the sync endpoint.
pub async fn refresh_default_window(
    orchestrator: &FallbackOrchestrator,
) -> crate::model::CalendarResult {
    let now = chrono::Utc::now();
    let query = CalendarQuery::default_for(now.date_naive());
    let result = orchestrator.refresh(&query).await;

    counter!("calendar_refresh_runs_total").increment(1);
    gauge!("calendar_refresh_last_run_ts").set(now.timestamp() as f64);

    tracing::info!(
        target: "calendar",
        source = %result.metadata.source,
        events = result.metadata.total_events,
        degraded = result.is_degraded(),
        "refresh tick"
    );
    result
}
