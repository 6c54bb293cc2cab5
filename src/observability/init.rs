//! Tracing subscriber setup.

use super::exporter;
use crate::Config;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::resource::Resource;
use std::path::PathBuf;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the span file inside the data directory.
pub const SPAN_FILE_NAME: &str = "molonari-spans.jsonl";

/// Location spans are exported to for `config`.
#[must_use]
pub fn span_file(config: &Config) -> PathBuf {
    config.data_dir.join(SPAN_FILE_NAME)
}

/// Installs the global tracing subscriber.
///
/// Spans pass through an [`EnvFilter`] built from `config.trace_level`
/// (default `"info"`) and are exported as JSON lines to [`span_file`].
///
/// Only the first call in a process takes effect. If the data directory
/// cannot be created, tracing stays disabled and computations run unaffected.
///
/// # Example
///
/// ```no_run
/// use molonari::observability::init_tracing;
/// use molonari::Config;
///
/// let config = Config {
///     trace_level: Some("molonari=debug".to_string()),
///     ..Config::default()
/// };
/// init_tracing(&config);
///
/// tracing::debug!("tracing is now active");
/// ```
pub fn init_tracing(config: &Config) {
    let level = config
        .trace_level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    if std::fs::create_dir_all(&config.data_dir).is_err() {
        return;
    }

    let resource = Resource::new(vec![opentelemetry::KeyValue::new(
        "service.name",
        "molonari",
    )]);
    let provider = exporter::create_tracer_provider(span_file(config), resource);
    let otel_layer = OpenTelemetryLayer::new(provider.tracer("molonari"));

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(otel_layer);

    let _ = subscriber.try_init();
}
