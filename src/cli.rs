use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "machine-console",
    about = "terminal client for predictive-maintenance telemetry with real-time sensor streaming",
    version
)]
pub struct Args {
    /// Backend REST base URL
    #[arg(long, default_value = "http://localhost:3001", env = "MACHINE_CONSOLE_API_URL")]
    pub api_url: String,

    /// Backend WebSocket base URL
    #[arg(long, default_value = "ws://localhost:3001", env = "MACHINE_CONSOLE_WS_URL")]
    pub ws_url: String,

    /// Prediction service base URL (external model host)
    #[arg(long, default_value = "https://ujiajh-api-ppd.hf.space")]
    pub predict_url: String,

    /// Session state file (defaults to ~/.machine-console/state.json)
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Reconnection delay in seconds
    #[arg(long, default_value = "1")]
    pub reconnect_delay: u64,

    /// Maximum number of automatic reconnection attempts (0 for unlimited)
    #[arg(long, default_value = "5")]
    pub max_reconnects: u32,

    /// Output format: table, csv, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - minimal output
    #[arg(long)]
    pub quiet: bool,

    /// Maximum number of readings to display before exiting (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_readings: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and persist the session credentials
    SignIn { email: String, password: String },

    /// Discard the local session
    SignOut,

    /// List machines, or show one machine by id
    Machines { id: Option<String> },

    /// Fetch recent readings for a machine over REST
    Readings {
        machine_id: String,

        #[arg(long, default_value = "30")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Stream live sensor readings for a machine
    Watch {
        machine_id: String,

        /// REST polling period in seconds, used when the stream is exhausted
        #[arg(long, default_value = "5")]
        poll_interval: u64,
    },

    /// Control the server-side sensor simulator
    Simulator {
        #[command(subcommand)]
        command: SimulatorCommand,
    },

    /// Run the failure prediction model on a machine's latest reading
    Predict { machine_id: String },
}

#[derive(Subcommand, Debug)]
pub enum SimulatorCommand {
    /// Start normal-mode data generation
    Start,

    /// Start anomaly injection for a machine; the injection call repeats
    /// every 5 seconds until Ctrl+C
    Anomaly { machine_id: String },

    /// Stop the simulator
    Stop,
}
