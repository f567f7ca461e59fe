//! Observability wiring for the controller.
//!
//! # Purpose
//! Installs the tracing subscriber used by every evaluator. Metrics are
//! emitted through the `metrics` facade; the embedding process installs
//! whichever recorder it exports with.
//!
//! # Notes
//! Initialization is guarded by `OnceLock` to keep startup idempotent in tests.
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static OBS_INIT: OnceLock<()> = OnceLock::new();

pub const IMAGE_ALLOW_DECISIONS: &str = "stagegate_image_allow_decisions_total";
pub const PERMISSION_CHECKS: &str = "stagegate_permission_checks_total";
pub const APPS_BUMPED: &str = "stagegate_apps_bumped_total";
pub const PROMOTIONS: &str = "stagegate_promotions_total";

pub fn init_observability(service_name: &str) {
    OBS_INIT.get_or_init(|| {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let registry = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer);
        let _ = registry.try_init();
        tracing::info!(service = %service_name, "observability initialized");
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
