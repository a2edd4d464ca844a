// file: src/subscription.rs
// description: machine-scoped sensor stream subscription over the managed connection

use crate::{
    connection::{ConnectionHandle, HandlerId},
    events::{ClientEvent, EventSender},
    types::{
        CONNECT_EVENT, SENSOR_UPDATE_EVENT, SUBSCRIBE_SENSOR_EVENT, SUBSCRIBED_EVENT,
        SensorReading, UNSUBSCRIBE_EVENT,
    },
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Live subscription to one machine's sensor stream.
///
/// The subscribe message is keyed off the connection's `connect` lifecycle
/// event rather than off attach: the server keeps subscription state only for
/// the life of a session, so every reconnect must re-issue it. Inbound
/// `sensor:update` payloads are normalized before they reach the consumer;
/// malformed ones are logged and dropped.
pub struct SensorSubscription {
    machine_id: String,
    handle: ConnectionHandle,
    connect_handler: HandlerId,
    subscribed_handler: HandlerId,
    update_handler: HandlerId,
}

impl SensorSubscription {
    pub fn attach<F>(
        handle: &ConnectionHandle,
        machine_id: &str,
        events: EventSender,
        on_reading: F,
    ) -> Self
    where
        F: Fn(Arc<SensorReading>) + Send + Sync + 'static,
    {
        let connect_handler = {
            let handle = handle.clone();
            let machine_id = machine_id.to_string();
            let events = events.clone();
            handle.clone().on(CONNECT_EVENT, move |_| {
                info!("Connection live, subscribing to sensor stream: {}", machine_id);
                handle.emit(SUBSCRIBE_SENSOR_EVENT, json!({ "machineId": machine_id }));
                let _ = events.try_send(ClientEvent::SubscriptionSent {
                    machine_id: machine_id.clone(),
                });
            })
        };

        let subscribed_handler = {
            let machine_id = machine_id.to_string();
            handle.on(SUBSCRIBED_EVENT, move |data| {
                debug!("Subscription acknowledged: {}", data);
                let _ = events.try_send(ClientEvent::Subscribed {
                    machine_id: machine_id.clone(),
                });
            })
        };

        let update_handler = handle.on(SENSOR_UPDATE_EVENT, move |data| {
            match SensorReading::from_wire(data) {
                Ok(reading) => {
                    crate::monitoring::READINGS_RECEIVED_COUNTER.increment(1);
                    on_reading(Arc::new(reading));
                }
                Err(e) => {
                    crate::monitoring::DROPPED_PAYLOADS_COUNTER.increment(1);
                    warn!("Dropping malformed sensor payload: {}", e);
                }
            }
        });

        // If the connection beat us to it, subscribe right away instead of
        // waiting for the next reconnect.
        if handle.is_connected() {
            handle.emit(SUBSCRIBE_SENSOR_EVENT, json!({ "machineId": machine_id }));
        }

        Self {
            machine_id: machine_id.to_string(),
            handle: handle.clone(),
            connect_handler,
            subscribed_handler,
            update_handler,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Remove all handlers and best-effort unsubscribe. Safe to call even if
    /// the connection never reached the connected phase; the unsubscribe emit
    /// is a no-op in that case.
    pub fn detach(self) {
        self.handle.off(CONNECT_EVENT, self.connect_handler);
        self.handle.off(SUBSCRIBED_EVENT, self.subscribed_handler);
        self.handle.off(SENSOR_UPDATE_EVENT, self.update_handler);
        self.handle
            .emit(UNSUBSCRIBE_EVENT, json!({ "machineId": self.machine_id }));
        debug!("Sensor subscription detached: {}", self.machine_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use crate::events::create_event_channel;
    use serde_json::json;
    use std::sync::Mutex;

    fn collecting_subscription(
        handle: &ConnectionHandle,
    ) -> (SensorSubscription, Arc<Mutex<Vec<SensorReading>>>) {
        let (events, _rx) = create_event_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = SensorSubscription::attach(handle, "m1", events, move |reading| {
            sink.lock().unwrap().push((*reading).clone());
        });
        (sub, seen)
    }

    #[test]
    fn forwards_normalized_readings() {
        let handle = ConnectionHandle::new();
        let (_sub, seen) = collecting_subscription(&handle);

        handle.dispatch(
            SENSOR_UPDATE_EVENT,
            &json!({
                "machine_id": "m1",
                "air_temp": 300.5,
                "process_temp": 310.2,
                "rotational_speed": 1500,
                "torque": 40,
                "tool_wear": 12
            }),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].machine_id, "m1");
        assert_eq!(seen[0].air_temp, 300.5);
    }

    #[test]
    fn drops_malformed_payloads() {
        let handle = ConnectionHandle::new();
        let (_sub, seen) = collecting_subscription(&handle);

        // No air temperature: must never reach the consumer
        handle.dispatch(
            SENSOR_UPDATE_EVENT,
            &json!({ "machine_id": "m1", "torque": 40 }),
        );

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn detach_silences_further_updates() {
        let handle = ConnectionHandle::new();
        let (sub, seen) = collecting_subscription(&handle);
        sub.detach();

        handle.dispatch(
            SENSOR_UPDATE_EVENT,
            &json!({
                "machine_id": "m1",
                "air_temp": 300.5,
                "process_temp": 310.2,
                "rotational_speed": 1500,
                "torque": 40,
                "tool_wear": 12
            }),
        );

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn detach_without_ever_connecting_does_not_panic() {
        let handle = ConnectionHandle::new();
        let (sub, _seen) = collecting_subscription(&handle);
        sub.detach();
    }
}
