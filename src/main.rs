//! Economic calendar proxy — binary entrypoint.
//! Boots the Axum HTTP server with the calendar routes, metrics, and the
//! optional in-process refresh scheduler.

use econ_calendar_proxy::config::CalendarConfig;
use econ_calendar_proxy::metrics::Metrics;
use econ_calendar_proxy::scheduler::spawn_refresh_scheduler;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("econ_calendar_proxy=info,calendar=info,warn"));

    // Shuttle may have installed a subscriber already; ignore that case.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = CalendarConfig::load_default()?;
    tracing::info!(
        sources = ?cfg.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        cache = ?cfg.cache.backend,
        ttl_secs = cfg.cache.ttl_secs,
        sync_enabled = cfg.cron_secret.is_some(),
        "calendar config loaded"
    );

    let metrics = match Metrics::init(cfg.cache.ttl_secs) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics disabled");
            None
        }
    };

    let (router, orchestrator) = econ_calendar_proxy::app(&cfg, metrics.as_ref())?;

    if let Some(every) = cfg.refresh_interval() {
        tracing::info!(interval_secs = every.as_secs(), "starting refresh scheduler");
        spawn_refresh_scheduler(orchestrator, every);
    }

    Ok(router.into())
}
