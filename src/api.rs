use std::collections::HashMap;
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::alerts::{CrisisDispatcher, MemoryAlertStore};
use crate::config::RiskConfig;
use crate::history::{ChatTurn, HistoryStore, JournalEntry, MemoryHistory, MoodEntry};
use crate::language::{DisabledTranslator, DynTranslator, HttpTranslator};
use crate::models::ModelStore;
use crate::notify::NotifierMux;
use crate::pipeline::{EvaluationOutcome, RiskPipeline};
use crate::reply::{DisabledReplyProvider, DynReplyProvider, HttpReplyProvider};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RiskPipeline>,
    history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<RiskPipeline>, history: Arc<dyn HistoryStore>) -> Self {
        Self { pipeline, history }
    }
}

/// Production wiring: config from disk, models lazy-loaded from the
/// configured directory, in-memory stores, channels from the environment.
pub fn create_router() -> Router {
    let config = RiskConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config load failed, using defaults");
        RiskConfig::default()
    });
    create_router_with_config(&config)
}

pub fn create_router_with_config(config: &RiskConfig) -> Router {
    let models = Arc::new(ModelStore::new(config.models_dir.clone()));
    let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistory::new());
    let dispatcher =
        CrisisDispatcher::new(Arc::new(MemoryAlertStore::new()), NotifierMux::from_env());

    let translator: DynTranslator = if config.translation.enabled {
        Arc::new(HttpTranslator::new(config.translation.endpoint.as_deref()))
    } else {
        Arc::new(DisabledTranslator)
    };
    let reply_provider: DynReplyProvider = if config.reply.enabled {
        Arc::new(HttpReplyProvider::new(
            config.reply.endpoint.clone(),
            config.reply.api_key.clone(),
            config.reply.model.clone(),
        ))
    } else {
        Arc::new(DisabledReplyProvider)
    };

    let pipeline = Arc::new(RiskPipeline::new(
        models,
        config,
        Arc::clone(&history),
        dispatcher,
        translator,
        reply_provider,
    ));
    router_with_state(AppState::new(pipeline, history))
}

pub fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/syna/chat", post(chat))
        .route("/syna/history", get(chat_history))
        .route("/syna/mood", post(post_mood))
        .route("/syna/mood/history", get(mood_history))
        .route("/syna/journal", post(post_journal))
        .route("/syna/journal/history", get(journal_history))
        .route("/syna/analytics/risks", get(analytics_risks))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Caller identity comes from the session layer in front of this service;
/// it forwards the resolved user as headers.
fn identity(headers: &HeaderMap) -> (String, String) {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("demo-user")
        .to_string();
    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("student")
        .to_string();
    (user_id, role)
}

#[derive(serde::Deserialize)]
struct ChatReq {
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatReq>,
) -> Result<Json<EvaluationOutcome>, StatusCode> {
    if body.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let (user_id, role) = identity(&headers);
    match state
        .pipeline
        .evaluate_message(&user_id, &role, &body.message)
        .await
    {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(user_id, error = %e, "message evaluation failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(serde::Serialize)]
struct ChatHistoryResp {
    history: Vec<ChatTurn>,
}

async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatHistoryResp>, StatusCode> {
    let (user_id, _) = identity(&headers);
    let history = state
        .history
        .chat_history(&user_id, 200)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "chat history fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(ChatHistoryResp { history }))
}

#[derive(serde::Deserialize)]
struct MoodReq {
    mood: i32,
}

async fn post_mood(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MoodReq>,
) -> Result<StatusCode, StatusCode> {
    if !(1..=10).contains(&body.mood) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let (user_id, _) = identity(&headers);
    state
        .history
        .record_mood(&user_id, body.mood)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "mood save failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(StatusCode::CREATED)
}

#[derive(serde::Serialize)]
struct MoodHistoryResp {
    history: Vec<MoodEntry>,
}

async fn mood_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MoodHistoryResp>, StatusCode> {
    let (user_id, _) = identity(&headers);
    let history = state
        .history
        .recent_moods(&user_id, 30)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "mood history fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(MoodHistoryResp { history }))
}

#[derive(serde::Deserialize)]
struct JournalReq {
    content: String,
}

async fn post_journal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<JournalReq>,
) -> Result<StatusCode, StatusCode> {
    if body.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let (user_id, _) = identity(&headers);
    state
        .history
        .record_journal(&user_id, &body.content)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "journal save failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(StatusCode::CREATED)
}

#[derive(serde::Serialize)]
struct JournalHistoryResp {
    history: Vec<JournalEntry>,
}

async fn journal_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<JournalHistoryResp>, StatusCode> {
    let (user_id, _) = identity(&headers);
    let history = state
        .history
        .journal_history(&user_id, 100)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "journal history fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(JournalHistoryResp { history }))
}

/// Per-user count of chat turns by risk label.
async fn analytics_risks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, usize>>, StatusCode> {
    let (user_id, _) = identity(&headers);
    let turns = state
        .history
        .chat_history(&user_id, usize::MAX)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "analytics fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for turn in turns {
        *counts
            .entry(turn.risk_label.as_str().to_string())
            .or_insert(0) += 1;
    }
    Ok(Json(counts))
}
