// file: src/types.rs
// description: wire envelope, canonical sensor reading model and REST payload types

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::TelemetryError;

/// Every frame on the sensor namespace is a JSON envelope: an event name plus
/// an arbitrary payload. Client->server: `subscribe:sensor`, `unsubscribe`.
/// Server->client: `subscribed`, `sensor:update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

pub const SUBSCRIBE_SENSOR_EVENT: &str = "subscribe:sensor";
pub const UNSUBSCRIBE_EVENT: &str = "unsubscribe";
pub const SUBSCRIBED_EVENT: &str = "subscribed";
pub const SENSOR_UPDATE_EVENT: &str = "sensor:update";
pub const CONNECT_EVENT: &str = "connect";
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Canonical normalized sensor reading. The backend emits these with either
/// snake_case or camelCase keys depending on which service produced them;
/// [`SensorReading::from_wire`] coalesces both spellings into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    #[serde(default)]
    pub udi: i64,
    pub machine_id: String,
    #[serde(default)]
    pub product_id: String,
    pub timestamp: Option<String>,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSummary {
    pub id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub machine_type: String,
}

/// Prefer an explicit non-null snake_case value, fall back to camelCase.
fn pick<'a>(value: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    match value.get(snake) {
        Some(v) if !v.is_null() => Some(v),
        _ => value.get(camel).filter(|v| !v.is_null()),
    }
}

fn pick_f64(value: &Value, snake: &str, camel: &str) -> Result<f64, TelemetryError> {
    pick(value, snake, camel)
        .and_then(Value::as_f64)
        .ok_or_else(|| TelemetryError::InvalidPayload(format!("missing numeric field `{snake}`")))
}

fn pick_string(value: &Value, snake: &str, camel: &str) -> Option<String> {
    pick(value, snake, camel)
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl SensorReading {
    /// Normalize a wire payload into the canonical reading. Accepts either
    /// snake_case or camelCase keys for every field; snake_case wins when both
    /// are present and not null. `created_at` falls back to `timestamp`.
    ///
    /// Payloads missing the air-temperature field (or any of the five
    /// measurements, or the machine id) are rejected so they never reach the
    /// reading buffer.
    pub fn from_wire(raw: &Value) -> Result<Self, TelemetryError> {
        // Air temperature is the canary for a well-formed reading; check it
        // first so the error names the primary field.
        let air_temp = pick_f64(raw, "air_temp", "airTemp")?;

        let machine_id = pick_string(raw, "machine_id", "machineId")
            .ok_or_else(|| TelemetryError::InvalidPayload("missing `machine_id`".to_string()))?;

        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string);
        let created_at = pick_string(raw, "created_at", "createdAt").or_else(|| timestamp.clone());

        let machine = raw
            .get("machine")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Ok(Self {
            udi: raw.get("udi").and_then(Value::as_i64).unwrap_or(0),
            machine_id,
            product_id: pick_string(raw, "product_id", "productId").unwrap_or_default(),
            timestamp,
            air_temp,
            process_temp: pick_f64(raw, "process_temp", "processTemp")?,
            rotational_speed: pick_f64(raw, "rotational_speed", "rotationalSpeed")?,
            torque: pick_f64(raw, "torque", "torque")?,
            tool_wear: pick_f64(raw, "tool_wear", "toolWear")?,
            created_at,
            machine,
        })
    }

    /// Reading timestamp as UTC, if the wire value parses.
    pub fn datetime_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Reading timestamp in the local timezone, if the wire value parses.
    pub fn datetime_local(&self) -> Option<DateTime<Local>> {
        self.datetime_utc().map(|dt| dt.with_timezone(&Local))
    }
}

/// Bounded, newest-first sequence of recent readings. The newest reading is
/// always at index 0; the oldest entry is evicted once capacity is reached.
#[derive(Debug)]
pub struct ReadingBuffer {
    readings: VecDeque<Arc<SensorReading>>,
    capacity: usize,
}

pub const READING_BUFFER_CAPACITY: usize = 30;

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new(READING_BUFFER_CAPACITY)
    }
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, reading: Arc<SensorReading>) {
        self.readings.push_front(reading);
        self.readings.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<&Arc<SensorReading>> {
        self.readings.front()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SensorReading>> {
        self.readings.iter()
    }
}

/// Machine catalog record from `GET /machines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(rename = "type", default)]
    pub machine_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub installation_date: Option<String>,
    pub last_maintenance_date: Option<String>,
    #[serde(default)]
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Opaque user record, persisted verbatim.
    #[serde(default)]
    pub user: Value,
}

/// Payload for the external prediction endpoint. Field names are fixed by the
/// model server and are snake_case on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    #[serde(rename = "type")]
    pub machine_type: String,
    pub air_temperature: f64,
    pub process_temperature: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
}

impl PredictionRequest {
    pub fn from_reading(machine_type: &str, reading: &SensorReading) -> Self {
        Self {
            // The catalog occasionally lacks a quality class; the model
            // expects one, so default to the low tier.
            machine_type: if machine_type.is_empty() {
                "L".to_string()
            } else {
                machine_type.to_string()
            },
            air_temperature: reading.air_temp,
            process_temperature: reading.process_temp,
            rotational_speed: reading.rotational_speed,
            torque: reading.torque,
            tool_wear: reading.tool_wear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Normal,
    Anomaly,
    Failure,
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionStatus::Normal => write!(f, "normal"),
            PredictionStatus::Anomaly => write!(f, "anomaly"),
            PredictionStatus::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    pub status: PredictionStatus,
    pub message: Option<String>,
    pub failure_type: Option<String>,
    pub failure_code: Option<String>,
}
