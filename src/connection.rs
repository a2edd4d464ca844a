// file: src/connection.rs
// description: WebSocket connection manager for the sensor stream namespace

use crate::{
    config::WebSocketConfig,
    connection_state::{ConnectionState, SharedConnectionState},
    error::TelemetryError,
    events::{ClientEvent, EventSender},
    types::{CONNECT_EVENT, DISCONNECT_EVENT, EventEnvelope},
};
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

/// Callback invoked with the `data` payload of a dispatched event.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by [`ConnectionHandle::on`], required for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: StdMutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
}

impl HandlerRegistry {
    fn insert(&self, event: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, event: &str, id: HandlerId) {
        let mut handlers = self
            .handlers
            .lock()
            .expect("handler registry lock poisoned");
        if let Some(entries) = handlers.get_mut(event) {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    fn matching(&self, event: &str) -> Vec<Handler> {
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .get(event)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

/// Cheap, cloneable surface over the managed connection. Registering or
/// removing handlers never touches the socket: the registry is consulted at
/// dispatch time, so handler churn cannot force a reconnect. The namespace
/// alone decides connection identity.
#[derive(Clone)]
pub struct ConnectionHandle {
    connected: Arc<AtomicBool>,
    outbound: Arc<StdMutex<Option<mpsc::UnboundedSender<Message>>>>,
    registry: Arc<HandlerRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub(crate) fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            outbound: Arc::new(StdMutex::new(None)),
            registry: Arc::new(HandlerRegistry::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Fire-and-forget send. Drops the event silently when the socket is not
    /// currently connected; outbound frames are never queued across
    /// disconnects.
    pub fn emit(&self, event: &str, data: Value) {
        if !self.is_connected() {
            debug!("emit `{}` while disconnected - dropped", event);
            return;
        }

        let envelope = EventEnvelope::new(event, data);
        match serde_json::to_string(&envelope) {
            Ok(text) => {
                let guard = self.outbound.lock().expect("outbound lock poisoned");
                if let Some(tx) = guard.as_ref() {
                    let _ = tx.send(Message::Text(text.into()));
                }
            }
            Err(e) => warn!("Failed to serialize `{}` event: {}", event, e),
        }
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry.insert(event, Arc::new(handler))
    }

    pub fn off(&self, event: &str, id: HandlerId) {
        self.registry.remove(event, id);
    }

    /// Request shutdown. Safe to call in any phase, including while a connect
    /// attempt or reconnect sleep is still in flight.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let guard = self.outbound.lock().expect("outbound lock poisoned");
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Message::Close(None));
        }
    }

    fn attach_outbound(&self, tx: mpsc::UnboundedSender<Message>) {
        *self.outbound.lock().expect("outbound lock poisoned") = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn detach_outbound(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.outbound.lock().expect("outbound lock poisoned") = None;
    }

    pub(crate) fn dispatch(&self, event: &str, data: &Value) {
        for handler in self.registry.matching(event) {
            handler(data);
        }
    }
}

/// Owns exactly one live socket for one namespace path. Reconnects with a
/// fixed delay up to a bounded attempt count; past that [`run`] returns
/// [`TelemetryError::MaxReconnectsExceeded`] and the caller decides whether to
/// fall back or recreate the manager.
///
/// [`run`]: ConnectionManager::run
pub struct ConnectionManager {
    config: WebSocketConfig,
    namespace: String,
    handle: ConnectionHandle,
    event_sender: EventSender,
    pub state: SharedConnectionState,
}

impl ConnectionManager {
    pub fn new(config: WebSocketConfig, namespace: &str, event_sender: EventSender) -> Self {
        Self {
            config,
            namespace: namespace.to_string(),
            handle: ConnectionHandle::new(),
            event_sender,
            state: Arc::new(Mutex::new(ConnectionState::new())),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.url.as_str().trim_end_matches('/'),
            self.namespace
        )
    }

    pub async fn run(&mut self) -> Result<()> {
        let _ = self.send_event(ClientEvent::Starting).await;

        loop {
            match self.connect_and_run().await {
                Ok(()) => break,
                Err(e) => {
                    if self.handle.is_shutdown() {
                        break;
                    }
                    error!("Connection error: {}", e);
                    let _ = self
                        .send_event(ClientEvent::ConnectionFailed(e.to_string()))
                        .await;
                    self.handle_connection_error().await?;
                }
            }
        }

        let _ = self.send_event(ClientEvent::Stopping).await;
        Ok(())
    }

    async fn connect_and_run(&mut self) -> Result<()> {
        let endpoint = self.endpoint();
        {
            let mut state = self.state.lock().await;
            state.mark_connecting();
        }
        let _ = self
            .send_event(ClientEvent::Connecting {
                url: endpoint.clone(),
            })
            .await;

        let (ws_stream, _) = connect_async(&endpoint).await.map_err(|e| {
            error!("Failed to connect to WebSocket: {}", e);
            TelemetryError::WebSocketError(e)
        })?;

        info!("WebSocket connection established to {}", endpoint);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        self.handle.attach_outbound(outbound_tx);

        let connection_id = {
            let mut state = self.state.lock().await;
            state.mark_connected();
            state.connection_id.clone()
        };
        crate::monitoring::CONNECTED_GAUGE.set(1.0);
        let _ = self.send_event(ClientEvent::Connected { connection_id }).await;

        // Lifecycle handlers observe connect before any inbound frame, so a
        // subscriber can re-issue its subscribe message on every reconnect.
        self.handle.dispatch(CONNECT_EVENT, &Value::Null);

        let (mut write, mut read) = ws_stream.split();

        let result = loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(message) => {
                        let closing = matches!(message, Message::Close(_));
                        if let Err(e) = write.send(message).await {
                            break Err(TelemetryError::WebSocketError(e).into());
                        }
                        if closing {
                            break Ok(());
                        }
                    }
                    None => break Ok(()),
                },
                incoming = read.next() => match incoming {
                    Some(Ok(message)) => {
                        if let Err(e) = self.handle_message(message).await {
                            break if self.handle.is_shutdown() { Ok(()) } else { Err(e) };
                        }
                    }
                    Some(Err(e)) => break Err(TelemetryError::WebSocketError(e).into()),
                    None => break Err(TelemetryError::ConnectionClosed.into()),
                },
            }
        };

        self.teardown_connection().await;
        result
    }

    async fn teardown_connection(&mut self) {
        self.handle.detach_outbound();
        crate::monitoring::CONNECTED_GAUGE.set(0.0);
        {
            let mut state = self.state.lock().await;
            state.mark_disconnected();
        }
        self.handle.dispatch(DISCONNECT_EVENT, &Value::Null);
        let _ = self.send_event(ClientEvent::Disconnected).await;
    }

    async fn handle_connection_error(&mut self) -> Result<()> {
        let attempt = {
            let mut state = self.state.lock().await;
            state.increment_reconnect()
        };
        crate::monitoring::RECONNECT_COUNTER.increment(1);

        if self.config.max_reconnects > 0 && attempt > self.config.max_reconnects {
            error!(
                "Maximum reconnection attempts ({}) reached",
                self.config.max_reconnects
            );
            return Err(TelemetryError::MaxReconnectsExceeded.into());
        }

        let delay = self.config.reconnect_delay;
        warn!(
            "Reconnecting in {} second(s) (attempt {})",
            delay.as_secs(),
            attempt
        );

        let _ = self
            .send_event(ClientEvent::Reconnecting {
                attempt,
                delay_secs: delay.as_secs(),
            })
            .await;

        sleep(delay).await;
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Text(text) => {
                trace!("Received text frame: {}", text);
                {
                    let mut state = self.state.lock().await;
                    state.record_message();
                }
                crate::monitoring::MESSAGES_RECEIVED_COUNTER.increment(1);
                self.process_text_frame(&text);
            }
            Message::Binary(data) => {
                warn!("Binary frames not supported ({} bytes)", data.len());
            }
            Message::Ping(_) => {
                debug!("Received ping");
                // The WebSocket library answers pings automatically
            }
            Message::Pong(_) => {
                debug!("Received pong");
            }
            Message::Close(frame) => {
                warn!("Received close frame: {:?}", frame);
                return Err(TelemetryError::ConnectionClosed.into());
            }
            Message::Frame(_) => {
                debug!("Received raw frame");
            }
        }
        Ok(())
    }

    fn process_text_frame(&self, text: &str) {
        match serde_json::from_str::<EventEnvelope>(text) {
            Ok(envelope) => {
                debug!("Dispatching `{}` event", envelope.event);
                self.handle.dispatch(&envelope.event, &envelope.data);
            }
            Err(e) => {
                warn!(
                    "Failed to parse frame as event envelope: {}. Frame: {}",
                    e,
                    text.chars().take(100).collect::<String>()
                );
            }
        }
    }

    async fn send_event(&self, event: ClientEvent) -> Result<()> {
        self.event_sender
            .send(event)
            .await
            .map_err(|e| TelemetryError::EventSendError(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_while_disconnected_is_a_silent_noop() {
        let handle = ConnectionHandle::new();
        // Must not panic, queue or error
        handle.emit("subscribe:sensor", json!({"machineId": "m1"}));
        assert!(!handle.is_connected());
    }

    #[test]
    fn handlers_are_read_at_dispatch_time() {
        let handle = ConnectionHandle::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let id = handle.on("sensor:update", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        handle.dispatch("sensor:update", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A handler registered after the "connection" was set up still fires
        let counted = Arc::clone(&calls);
        handle.on("sensor:update", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        handle.dispatch("sensor:update", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.off("sensor:update", id);
        handle.dispatch("sensor:update", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn close_before_connect_marks_shutdown() {
        let handle = ConnectionHandle::new();
        handle.close();
        assert!(handle.is_shutdown());
    }
}
