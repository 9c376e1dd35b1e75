use crate::config::{LogFormat, TelemetryConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const RECORDS_FETCHED: &str = "source_records_fetched_total";
pub const FETCH_DURATION_MS: &str = "source_fetch_duration_ms";
pub const FETCH_ERRORS: &str = "source_fetch_errors_total";
pub const WORKERS: &str = "source_workers";

/// Installs the tracing subscriber and, when enabled, the Prometheus exporter.
///
/// Logs go to stderr so stdout stays free for record output.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    if config.metrics_enabled {
        let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        describe_metrics();

        tracing::info!(
            port = config.metrics_port,
            "Metrics endpoint started at http://0.0.0.0:{}/metrics",
            config.metrics_port
        );
    }

    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(RECORDS_FETCHED, "Records returned by source fetches");
    metrics::describe_histogram!(FETCH_DURATION_MS, "Latency of a single source fetch");
    metrics::describe_counter!(FETCH_ERRORS, "Failed source fetches");
    metrics::describe_gauge!(WORKERS, "Workers declared by the loaded source");
}

pub fn shutdown() {
    tracing::info!("Shutting down telemetry");
}
