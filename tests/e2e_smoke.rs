// tests/e2e_smoke.rs

use std::sync::Arc;

use psynova_risk_engine::alerts::{CrisisDispatcher, MemoryAlertStore};
use psynova_risk_engine::api::{router_with_state, AppState};
use psynova_risk_engine::config::RiskConfig;
use psynova_risk_engine::history::{HistoryStore, MemoryHistory};
use psynova_risk_engine::language::DisabledTranslator;
use psynova_risk_engine::models::ModelStore;
use psynova_risk_engine::notify::NotifierMux;
use psynova_risk_engine::pipeline::RiskPipeline;
use psynova_risk_engine::reply::DisabledReplyProvider;
use shuttle_axum::axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt; // for `oneshot` (tower 0.5 with features=["util"])

/// Plain Axum router without the Shuttle runtime. The model directory does
/// not exist, so every model-backed detector degrades to its low signal and
/// only the rule detector carries real weight.
fn test_app() -> Router {
    let config = RiskConfig {
        models_dir: "/nonexistent-test-models".to_string(),
        ..RiskConfig::default()
    };
    let models = Arc::new(ModelStore::new(config.models_dir.clone()));
    let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistory::new());
    let dispatcher = CrisisDispatcher::new(Arc::new(MemoryAlertStore::new()), NotifierMux::noop());
    let pipeline = Arc::new(RiskPipeline::new(
        models,
        &config,
        Arc::clone(&history),
        dispatcher,
        Arc::new(DisabledTranslator),
        Arc::new(DisabledReplyProvider),
    ));
    router_with_state(AppState::new(pipeline, history))
}

fn chat_request(message: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/syna/chat")
        .header("content-type", "application/json")
        .header("x-user-id", "smoke-user")
        .body(Body::from(format!(r#"{{"message":"{message}"}}"#)))
        .unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let app = test_app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn crisis_phrase_returns_high_with_grounding_reply() {
    let app = test_app();
    let resp = app
        .oneshot(chat_request("I want to kill myself"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["risk_level"], "high");
    assert_eq!(body["crisis"], true);
    assert_eq!(body["trigger_appointment_popup"], true);
    let reply = body["reply"].as_str().unwrap();
    assert!(reply.contains("deep breath"));
}

#[tokio::test]
async fn benign_message_returns_low_with_fallback_reply() {
    let app = test_app();
    let resp = app
        .oneshot(chat_request("I had a mediocre day"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["risk_level"], "low");
    assert_eq!(body["crisis"], false);
    assert!(body["reply"].as_str().unwrap().contains("I'm here with you"));
}

#[tokio::test]
async fn chat_turns_show_up_in_history() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(chat_request("long week, but managing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/syna/history")
                .header("x-user-id", "smoke-user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let history = body["history"].as_array().unwrap();
    // User turn plus bot reply, most recent first.
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["sender"], "bot");
    assert_eq!(history[1]["text"], "long week, but managing");
    assert_eq!(history[1]["risk_label"], "low");
}

#[tokio::test]
async fn repeated_evaluation_is_deterministic() {
    let app = test_app();
    let mut labels = Vec::new();
    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(chat_request("exams are wearing me down"))
            .await
            .unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        labels.push(body["risk_level"].as_str().unwrap().to_string());
    }
    assert_eq!(labels[0], labels[1]);
}
