//! End-to-end smoke tests over the HTTP surface (`spec.md §6.1`/§8), driven
//! through the router directly via `tower::ServiceExt::oneshot` rather than a
//! bound socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hearth_server::config::HearthConfig;
use hearth_server::state::AppState;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> axum::Router {
    let config = HearthConfig::default();
    let (engine, probes) = hearth_server::bootstrap::build_engine(&config).expect("engine must bootstrap with defaults");
    let state = AppState::new(engine, config, probes);
    hearth_server::routes::router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body must collect").to_bytes();
    serde_json::from_slice(&bytes).expect("body must be valid JSON")
}

#[tokio::test]
async fn health_reports_startup_probes() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").method("GET").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["status"].is_string());
    assert!(body["probes"].is_array());
}

#[tokio::test]
async fn process_request_rejects_an_empty_user_message() {
    let app = test_app().await;
    let payload = json!({ "user_message": "   " });
    let response = app
        .oneshot(
            Request::builder()
                .uri("/process-request")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn process_request_returns_a_system_message_over_an_empty_store() {
    let app = test_app().await;
    let payload = json!({ "user_message": "Mekkora a nedvesség a kertben?", "session_id": "sess-1" });
    let response = app
        .oneshot(
            Request::builder()
                .uri("/process-request")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let messages = body["messages"].as_array().expect("messages must be an array");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "system");
}

#[tokio::test]
async fn process_conversation_unwraps_a_meta_task_payload() {
    let app = test_app().await;
    let raw = "### Task: Generate tags ### Chat History: <chat_history>USER: Hány fok van a nappaliban? ASSISTANT: 21.</chat_history>";
    let payload = json!(raw);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/process-conversation")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["strategy_used"], "metatask");
}

#[tokio::test]
async fn process_response_acknowledges_tool_calls() {
    let app = test_app().await;
    let payload = json!({
        "tool_calls": [
            { "id": "call_1", "function": { "name": "light.turn_on", "arguments": "{\"entity_id\": \"light.nappali\"}" } }
        ]
    });
    let response = app
        .oneshot(
            Request::builder()
                .uri("/process-response")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["message"].as_str().unwrap().contains("light.turn_on"));
}
