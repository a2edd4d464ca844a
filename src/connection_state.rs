/// file: src/connection_state.rs
/// description: Separate connection state tracking from socket logic
use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Lifecycle phase of the managed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
pub struct ConnectionState {
    pub connection_id: String,
    pub phase: ConnectionPhase,
    pub reconnect_count: AtomicU32,
    pub last_message_time: Option<Instant>,
    pub total_messages_received: AtomicU64,
    pub last_disconnection_time: Option<Instant>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            phase: ConnectionPhase::Disconnected,
            reconnect_count: AtomicU32::new(0),
            last_message_time: None,
            total_messages_received: AtomicU64::new(0),
            last_disconnection_time: None,
        }
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_connecting(&mut self) {
        self.phase = ConnectionPhase::Connecting;
    }

    /// A fresh connection gets a fresh id and a zeroed attempt counter.
    pub fn mark_connected(&mut self) {
        self.connection_id = uuid::Uuid::new_v4().to_string();
        self.last_message_time = Some(Instant::now());
        self.phase = ConnectionPhase::Connected;
        self.reconnect_count.store(0, Ordering::Relaxed);
    }

    pub fn mark_disconnected(&mut self) {
        self.phase = ConnectionPhase::Disconnected;
        self.last_disconnection_time = Some(Instant::now());
    }

    pub fn increment_reconnect(&mut self) -> u32 {
        self.mark_disconnected();
        self.reconnect_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_message(&mut self) {
        self.last_message_time = Some(Instant::now());
        self.total_messages_received.fetch_add(1, Ordering::Relaxed);
    }
}

pub type SharedConnectionState = Arc<Mutex<ConnectionState>>;
