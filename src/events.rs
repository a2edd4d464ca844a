/// file: src/events.rs
/// description: Event system to decouple stream handling from UI presentation
use crate::types::SensorReading;
use std::sync::Arc;
use tokio::sync::mpsc;

// Use Arc to avoid cloning readings on the hot path
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Starting,
    Connecting { url: String },
    Connected { connection_id: String },
    SubscriptionSent { machine_id: String },
    Subscribed { machine_id: String },
    ReadingReceived(Arc<SensorReading>),
    ConnectionFailed(String),
    Reconnecting { attempt: u32, delay_secs: u64 },
    Disconnected,
    Stopping,
}

// Bounded channel so a stalled consumer cannot grow memory without bound.
// The simulator emits at most a handful of readings per second, so a 1k
// buffer covers long render pauses.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
