/// file: src/config.rs
/// description: Runtime configuration assembled from CLI arguments
use crate::cli::Args;
use crate::simulator::ANOMALY_INJECTION_PERIOD;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Namespace path carrying the sensor stream on the shared realtime endpoint.
pub const SENSOR_NAMESPACE: &str = "/sensors";

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub websocket: WebSocketConfig,
    pub simulator: SimulatorConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub predict_url: Url,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub anomaly_period: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub state_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        Ok(Config {
            api: ApiConfig {
                base_url: Url::parse(&args.api_url)?,
                predict_url: Url::parse(&args.predict_url)?,
            },
            websocket: WebSocketConfig {
                url: Url::parse(&args.ws_url)?,
                reconnect_delay: Duration::from_secs(args.reconnect_delay),
                max_reconnects: args.max_reconnects,
            },
            simulator: SimulatorConfig {
                anomaly_period: ANOMALY_INJECTION_PERIOD,
            },
            storage: StorageConfig {
                state_file: args
                    .state_file
                    .clone()
                    .unwrap_or_else(default_state_file),
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
        })
    }
}

fn default_state_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".machine-console")
            .join("state.json"),
        None => PathBuf::from("machine-console-state.json"),
    }
}
