// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod alerts;
pub mod api;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod gbdt;
pub mod history;
pub mod language;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod reply;
pub mod risk;
pub mod sentiment;
pub mod tfidf;

// ---- Re-exports for stable public API ----
pub use crate::alerts::{AlertStore, CrisisAlert, CrisisDispatcher, MemoryAlertStore, RiskSource};
pub use crate::api::{create_router, create_router_with_config, router_with_state, AppState};
pub use crate::history::{HistoryStore, MemoryHistory, Sender};
pub use crate::models::ModelStore;
pub use crate::notify::NotifierMux;
pub use crate::pipeline::{EvaluationOutcome, RiskPipeline};
pub use crate::risk::{RiskAssessment, RiskLabel, RiskLevel};
