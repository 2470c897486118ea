//! Risk Engine Service — Binary Entrypoint
//! Boots the Axum HTTP server with the risk pipeline wired behind it.

use psynova_risk_engine::config::RiskConfig;
use psynova_risk_engine::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - RISK_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("RISK_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("psynova_risk_engine=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This makes
    // RISK_CONFIG_PATH, SMTP and channel settings available early.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = RiskConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        RiskConfig::default()
    });

    let metrics = Metrics::init(config.semantic_threshold);

    let router = psynova_risk_engine::api::create_router_with_config(&config)
        .merge(metrics.router());

    Ok(router.into())
}
