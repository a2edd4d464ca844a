//! Terminal client for an industrial predictive-maintenance backend.
//!
//! Streams live sensor readings over a namespaced WebSocket with bounded
//! automatic reconnection, drives the server-side sensor simulator over REST,
//! and exposes the rest of the backend surface (session, machine catalog,
//! historical readings, failure prediction) as CLI subcommands.

/// REST client for the backend API and the prediction service.
pub mod api;
/// Command-line argument definitions.
pub mod cli;
/// Runtime configuration model.
pub mod config;
/// WebSocket connection manager and pub/sub surface.
pub mod connection;
/// Connection lifecycle state and counters.
pub mod connection_state;
/// Error types used across the crate.
pub mod error;
/// Event bus messages between stream client and UI.
pub mod events;
/// Terminal output formatters.
pub mod formatter;
/// Metrics setup and global counters.
pub mod monitoring;
/// Simulator control state machine.
pub mod simulator;
/// Durable session/state storage.
pub mod store;
/// Machine-scoped sensor stream subscription.
pub mod subscription;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Wire envelope and canonical data models.
pub mod types;
/// UI controller and presentation loop.
pub mod ui;

/// Primary crate error type.
pub use error::TelemetryError;
