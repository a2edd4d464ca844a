// Integration tests for the REST client against a local mock backend.

use axum::{Json, Router, http::StatusCode, routing::get, routing::post};
use machine_console::{
    TelemetryError,
    api::ApiClient,
    config::ApiConfig,
    store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, StateStore, USER_KEY},
};
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str) -> (ApiClient, Arc<StateStore>) {
    let path = std::env::temp_dir().join(format!(
        "machine-console-rest-test-{}.json",
        uuid::Uuid::new_v4()
    ));
    let store = Arc::new(StateStore::load(path));
    let config = ApiConfig {
        base_url: Url::parse(base).unwrap(),
        predict_url: Url::parse("http://127.0.0.1:9").unwrap(),
    };
    (ApiClient::new(&config, Arc::clone(&store)), store)
}

#[tokio::test]
async fn rejected_sign_in_surfaces_server_message_and_stores_nothing() {
    let router = Router::new().route(
        "/auth/signin",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Invalid credentials"})),
            )
        }),
    );
    let base = spawn_backend(router).await;
    let (api, store) = client(&base);

    let err = api.sign_in("a@b.com", "x").await.unwrap_err();
    match err {
        TelemetryError::ApiError { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
}

#[tokio::test]
async fn successful_sign_in_persists_session() {
    let router = Router::new().route(
        "/auth/signin",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["email"], "a@b.com");
            assert_eq!(body["password"], "secret");
            Json(json!({
                "accessToken": "tok-1",
                "refreshToken": "ref-1",
                "user": {"email": "a@b.com", "name": "Ada"}
            }))
        }),
    );
    let base = spawn_backend(router).await;
    let (api, store) = client(&base);

    let response = api.sign_in("a@b.com", "secret").await.unwrap();
    assert_eq!(response.access_token, "tok-1");
    assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("tok-1"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("ref-1"));
    assert!(store.get(USER_KEY).unwrap().contains("Ada"));
}

#[tokio::test]
async fn machine_endpoints_accept_wrapped_and_bare_payloads() {
    let router = Router::new()
        .route(
            "/machines",
            get(|| async {
                Json(json!({"data": [
                    {"id": "m1", "productId": "L47181", "type": "L", "name": "Lathe 3"}
                ]}))
            }),
        )
        .route(
            "/machines/m1",
            get(|| async {
                Json(json!({"id": "m1", "productId": "L47181", "type": "L", "name": "Lathe 3"}))
            }),
        );
    let base = spawn_backend(router).await;
    let (api, store) = client(&base);
    store.set(ACCESS_TOKEN_KEY, "tok").unwrap();

    let machines = api.machines().await.unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].id, "m1");

    let machine = api.machine("m1").await.unwrap();
    assert_eq!(machine.machine_type, "L");
}

#[tokio::test]
async fn readings_endpoint_normalizes_snake_case_and_skips_malformed() {
    let router = Router::new().route(
        "/sensors",
        get(|| async {
            Json(json!({"data": [
                {
                    "udi": 2,
                    "machine_id": "m1",
                    "air_temp": 301.0,
                    "process_temp": 311.0,
                    "rotational_speed": 1490,
                    "torque": 42.5,
                    "tool_wear": 15
                },
                // Missing air_temp: must be skipped, not fail the fetch
                {"udi": 1, "machine_id": "m1", "torque": 40}
            ]}))
        }),
    );
    let base = spawn_backend(router).await;
    let (api, store) = client(&base);
    store.set(ACCESS_TOKEN_KEY, "tok").unwrap();

    let readings = api.sensor_readings("m1", 30, 0).await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].udi, 2);
    assert_eq!(readings[0].air_temp, 301.0);
}

#[tokio::test]
async fn requests_without_credential_fail_before_hitting_the_network() {
    let (api, _store) = client("http://127.0.0.1:9");
    let err = api.machines().await.unwrap_err();
    assert!(matches!(err, TelemetryError::MissingCredential));
}
