// file: src/api.rs
// description: REST client for the backend API and the external prediction service

use crate::{
    config::ApiConfig,
    error::TelemetryError,
    simulator::SimulatorApi,
    store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, StateStore, USER_KEY},
    types::{Machine, PredictionRequest, PredictionResponse, SensorReading, SignInRequest, SignInResponse},
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    predict_url: Url,
    store: Arc<StateStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, store: Arc<StateStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            predict_url: config.predict_url.clone(),
            store,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Bearer credential is read from the store at call time, never cached,
    /// so a re-sign-in takes effect immediately.
    fn bearer(&self) -> Result<String, TelemetryError> {
        self.store
            .get(ACCESS_TOKEN_KEY)
            .ok_or(TelemetryError::MissingCredential)
    }

    /// Map a non-success response to a typed error carrying the server's
    /// `message` field when one is present.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TelemetryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        Err(TelemetryError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    /// Some backend endpoints wrap their payload in `{"data": ...}`, some
    /// return it bare. Accept both.
    fn unwrap_data(value: Value) -> Value {
        match value.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => value,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, TelemetryError> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_authorized(&self, path: &str) -> Result<(), TelemetryError> {
        let token = self.bearer()?;
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, TelemetryError> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/auth/signin"))
            .json(&request)
            .send()
            .await?;
        let body: SignInResponse = Self::check(response).await?.json().await?;

        self.store.set(ACCESS_TOKEN_KEY, &body.access_token)?;
        self.store.set(REFRESH_TOKEN_KEY, &body.refresh_token)?;
        self.store.set(USER_KEY, &serde_json::to_string(&body.user)?)?;
        debug!("Stored session credentials for {}", email);
        Ok(body)
    }

    /// Local credentials are discarded regardless of how the server answers.
    pub async fn sign_out(&self) -> Result<(), TelemetryError> {
        if let Ok(token) = self.bearer() {
            let result = self
                .http
                .post(self.url("/auth/signout"))
                .bearer_auth(token)
                .send()
                .await;
            if let Err(e) = result {
                warn!("Sign-out request failed, discarding local session anyway: {}", e);
            }
        }
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        Ok(())
    }

    pub async fn machines(&self) -> Result<Vec<Machine>, TelemetryError> {
        let body = self.get_json("/machines", &[]).await?;
        Ok(serde_json::from_value(Self::unwrap_data(body))?)
    }

    pub async fn machine(&self, id: &str) -> Result<Machine, TelemetryError> {
        let body = self.get_json(&format!("/machines/{id}"), &[]).await?;
        Ok(serde_json::from_value(Self::unwrap_data(body))?)
    }

    /// Paginated readings, newest first, run through the same normalizer as
    /// the socket payloads. Malformed entries are logged and skipped.
    pub async fn sensor_readings(
        &self,
        machine_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SensorReading>, TelemetryError> {
        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("machineId", machine_id.to_string()),
        ];
        let body = self.get_json("/sensors", &query).await?;

        let items = Self::unwrap_data(body);
        let items = items
            .as_array()
            .ok_or_else(|| TelemetryError::InvalidPayload("expected reading array".to_string()))?;

        let mut readings = Vec::with_capacity(items.len());
        for item in items {
            match SensorReading::from_wire(item) {
                Ok(reading) => readings.push(reading),
                Err(e) => warn!("Skipping malformed reading from REST: {}", e),
            }
        }
        Ok(readings)
    }

    /// External model endpoint on a different host, unauthenticated.
    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, TelemetryError> {
        let url = format!(
            "{}/predict",
            self.predict_url.as_str().trim_end_matches('/')
        );
        let response = self.http.post(url).json(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl SimulatorApi for ApiClient {
    async fn start_normal(&self) -> Result<(), TelemetryError> {
        self.post_authorized("/sensors/simulator/start").await
    }

    async fn start_anomaly(&self, machine_id: &str) -> Result<(), TelemetryError> {
        self.post_authorized(&format!("/sensors/simulator/anomaly/{machine_id}"))
            .await
    }

    async fn stop(&self) -> Result<(), TelemetryError> {
        self.post_authorized("/sensors/simulator/stop").await
    }
}
