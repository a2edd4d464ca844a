// Integration tests driving the stream client against a real local
// WebSocket server.

use futures_util::{SinkExt, StreamExt};
use machine_console::{
    TelemetryError,
    config::WebSocketConfig,
    connection::ConnectionManager,
    events::{ClientEvent, create_event_channel},
    subscription::SensorSubscription,
    types::SensorReading,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

fn ws_config(addr: std::net::SocketAddr, max_reconnects: u32) -> WebSocketConfig {
    WebSocketConfig {
        url: Url::parse(&format!("ws://{addr}")).unwrap(),
        reconnect_delay: Duration::from_millis(100),
        max_reconnects,
    }
}

#[tokio::test]
async fn resubscribes_after_reconnect_and_delivers_readings() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (subs_tx, mut subs_rx) = mpsc::unbounded_channel::<Value>();

    let server = tokio::spawn(async move {
        // First session: take the subscribe, push one update, then drop the
        // socket to force a client reconnect.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let envelope: Value = serde_json::from_str(&text).unwrap();
                if envelope["event"] == "subscribe:sensor" {
                    subs_tx.send(envelope["data"].clone()).unwrap();
                    break;
                }
            }
        }
        let subscribed = json!({"event": "subscribed", "data": {"machineId": "m1"}});
        ws.send(Message::Text(subscribed.to_string().into()))
            .await
            .unwrap();
        let update = json!({
            "event": "sensor:update",
            "data": {
                "machine_id": "m1",
                "air_temp": 300.5,
                "process_temp": 310.2,
                "rotational_speed": 1500,
                "torque": 40,
                "tool_wear": 12
            }
        });
        ws.send(Message::Text(update.to_string().into()))
            .await
            .unwrap();
        drop(ws);

        // Second session: the same mounted subscription must subscribe again.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    let envelope: Value = serde_json::from_str(&text).unwrap();
                    if envelope["event"] == "subscribe:sensor" {
                        subs_tx.send(envelope["data"].clone()).unwrap();
                    }
                    if envelope["event"] == "unsubscribe" {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let (event_tx, mut event_rx) = create_event_channel();
    let mut manager = ConnectionManager::new(ws_config(addr, 5), "/sensors", event_tx.clone());
    let handle = manager.handle();

    let (reading_tx, mut reading_rx) = mpsc::unbounded_channel::<Arc<SensorReading>>();
    let subscription = SensorSubscription::attach(&handle, "m1", event_tx, move |reading| {
        let _ = reading_tx.send(reading);
    });

    let manager_task = tokio::spawn(async move { manager.run().await });
    let drain = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

    let first = timeout(Duration::from_secs(5), subs_rx.recv())
        .await
        .expect("first subscribe within deadline")
        .unwrap();
    assert_eq!(first["machineId"], "m1");

    let reading = timeout(Duration::from_secs(5), reading_rx.recv())
        .await
        .expect("reading within deadline")
        .unwrap();
    assert_eq!(reading.machine_id, "m1");
    assert_eq!(reading.air_temp, 300.5);
    assert_eq!(reading.tool_wear, 12.0);

    // The server dropped the session; a fresh subscribe must arrive for the
    // same machine without re-attaching.
    let second = timeout(Duration::from_secs(5), subs_rx.recv())
        .await
        .expect("re-subscribe within deadline")
        .unwrap();
    assert_eq!(second["machineId"], "m1");

    subscription.detach();
    handle.close();
    timeout(Duration::from_secs(5), manager_task)
        .await
        .expect("manager shutdown within deadline")
        .unwrap()
        .unwrap();
    let _ = timeout(Duration::from_secs(5), server).await;
    drain.abort();
}

#[tokio::test]
async fn reconnect_budget_is_bounded() {
    // Reserve a port with nothing listening behind it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (event_tx, mut event_rx) = create_event_channel();
    let mut manager = ConnectionManager::new(
        WebSocketConfig {
            url: Url::parse(&format!("ws://{addr}")).unwrap(),
            reconnect_delay: Duration::from_millis(10),
            max_reconnects: 3,
        },
        "/sensors",
        event_tx,
    );

    let err = timeout(Duration::from_secs(5), manager.run())
        .await
        .expect("run returns within deadline")
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TelemetryError>(),
        Some(TelemetryError::MaxReconnectsExceeded)
    ));

    let mut reconnect_events = 0;
    while let Ok(event) = event_rx.try_recv() {
        if matches!(event, ClientEvent::Reconnecting { .. }) {
            reconnect_events += 1;
        }
    }
    assert_eq!(reconnect_events, 3);
}
