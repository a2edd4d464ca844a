use crate::error::TelemetryError;
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("machine_console_messages_received_total"));
pub static READINGS_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("machine_console_readings_received_total"));
pub static DROPPED_PAYLOADS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("machine_console_dropped_payloads_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("machine_console_reconnects_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("machine_console_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "machine-console")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_handle) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            // Initialize metrics with default values
            MESSAGES_RECEIVED_COUNTER.absolute(0);
            READINGS_RECEIVED_COUNTER.absolute(0);
            DROPPED_PAYLOADS_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(TelemetryError::MetricsError(e.to_string()).into())
        }
    }
}
