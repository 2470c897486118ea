// tests/api_http.rs
// Route-level behavior: validation, per-user isolation, mood/journal/analytics.

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
use tower::ServiceExt;

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

fn post_json(uri: &str, user: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body))
        .unwrap()
}

fn get_as(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(resp: shuttle_axum::axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn empty_chat_message_is_rejected() {
    let app = test_app();
    let resp = app
        .oneshot(post_json("/syna/chat", "u1", r#"{"message":"   "}"#.into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mood_outside_scale_is_rejected() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(post_json("/syna/mood", "u1", r#"{"mood":0}"#.into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(post_json("/syna/mood", "u1", r#"{"mood":11}"#.into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mood_round_trips_through_history() {
    let app = test_app();
    for score in [3, 9] {
        let resp = app
            .clone()
            .oneshot(post_json(
                "/syna/mood",
                "u1",
                format!(r#"{{"mood":{score}}}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = app
        .oneshot(get_as("/syna/mood/history", "u1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    // Most recent first.
    assert_eq!(history[0]["score"], 9);
}

#[tokio::test]
async fn journal_round_trips_and_rejects_empty() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(post_json("/syna/journal", "u1", r#"{"content":""}"#.into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/syna/journal",
            "u1",
            r#"{"content":"rough start, better evening"}"#.into(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(get_as("/syna/journal/history", "u1"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(
        body["history"][0]["content"],
        "rough start, better evening"
    );
}

#[tokio::test]
async fn users_are_isolated() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(post_json("/syna/mood", "alice", r#"{"mood":5}"#.into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(get_as("/syna/mood/history", "bob"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert!(body["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn analytics_counts_turns_by_label() {
    let app = test_app();
    // One crisis message (fast path) and one benign message.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/syna/chat",
            "u1",
            r#"{"message":"I want to kill myself"}"#.into(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/syna/chat",
            "u1",
            r#"{"message":"I had a mediocre day"}"#.into(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get_as("/syna/analytics/risks", "u1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["high"], 1);
    // Benign user turn plus its persisted bot reply.
    assert_eq!(body["low"], 2);
}
