use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API request failed ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("No access token in the session store - sign in first")]
    MissingCredential,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,

    #[error("Invalid sensor payload: {0}")]
    InvalidPayload(String),

    #[error("Event channel error: {0}")]
    EventSendError(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}
