//! Crisis alert records and the dispatch-and-mark-sent flow.
//!
//! Every qualifying message creates a fresh alert row with all four
//! stakeholder flags false, then notifies each party best-effort and flips
//! the flags. Flags only ever transition false to true; the record's
//! message, user and source never change after creation.
//!
//! Known gap carried from the product's alerting history: the flags are
//! flipped after attempting all channels, not on confirmed delivery.
//! Per-channel outcomes are logged and counted so operators can see the
//! difference; see DESIGN.md before tightening this.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::notify::{AlertNotice, NotifierMux};

/// Which path raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    /// Literal crisis phrase, caught before any model ran.
    KeywordMatch,
    /// The fused multi-detector assessment.
    Pipeline,
}

impl RiskSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskSource::KeywordMatch => "keyword_match",
            RiskSource::Pipeline => "risk_pipeline",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrisisAlert {
    pub id: u64,
    pub user_id: String,
    pub role: String,
    pub message: String,
    pub risk_source: RiskSource,
    pub alerted_counselor: bool,
    pub alerted_team: bool,
    pub alerted_guardian: bool,
    pub alerted_institution: bool,
    pub created_at: DateTime<Utc>,
}

impl CrisisAlert {
    pub fn fully_alerted(&self) -> bool {
        self.alerted_counselor
            && self.alerted_team
            && self.alerted_guardian
            && self.alerted_institution
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a new alert with all flags false; returns its id.
    async fn insert(
        &self,
        user_id: &str,
        role: &str,
        message: &str,
        risk_source: RiskSource,
    ) -> Result<u64>;

    /// Flip all four alerted flags to true.
    async fn mark_all_alerted(&self, alert_id: u64) -> Result<()>;

    /// Most recent first.
    async fn recent(&self, limit: usize) -> Result<Vec<CrisisAlert>>;
}

#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<Vec<CrisisAlert>>,
    next_id: AtomicU64,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert(
        &self,
        user_id: &str,
        role: &str,
        message: &str,
        risk_source: RiskSource,
    ) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let alert = CrisisAlert {
            id,
            user_id: user_id.to_string(),
            role: role.to_string(),
            message: message.to_string(),
            risk_source,
            alerted_counselor: false,
            alerted_team: false,
            alerted_guardian: false,
            alerted_institution: false,
            created_at: Utc::now(),
        };
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
        Ok(id)
    }

    async fn mark_all_alerted(&self, alert_id: u64) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| anyhow!("unknown alert id {alert_id}"))?;
        alert.alerted_counselor = true;
        alert.alerted_team = true;
        alert.alerted_guardian = true;
        alert.alerted_institution = true;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CrisisAlert>> {
        let alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }
}

/// Number of characters of the triggering message shared with channels.
const EXCERPT_LEN: usize = 100;

pub struct CrisisDispatcher {
    store: std::sync::Arc<dyn AlertStore>,
    channels: NotifierMux,
}

impl CrisisDispatcher {
    pub fn new(store: std::sync::Arc<dyn AlertStore>, channels: NotifierMux) -> Self {
        Self { store, channels }
    }

    pub fn store(&self) -> &dyn AlertStore {
        self.store.as_ref()
    }

    /// Record the alert, notify all four parties, flip the flags. Called
    /// once per qualifying message; rapid repeats produce distinct rows.
    pub async fn dispatch(
        &self,
        user_id: &str,
        role: &str,
        message: &str,
        risk_source: RiskSource,
    ) -> Result<u64> {
        let alert_id = self.store.insert(user_id, role, message, risk_source).await?;
        metrics::counter!("crisis_alerts_total", "source" => risk_source.as_str())
            .increment(1);
        error!(
            alert_id,
            user_id,
            source = risk_source.as_str(),
            "crisis alert triggered"
        );

        let notice = AlertNotice {
            alert_id,
            user_id: user_id.to_string(),
            risk_source: risk_source.as_str().to_string(),
            message_excerpt: message.chars().take(EXCERPT_LEN).collect(),
            created_at: Utc::now(),
        };
        let outcomes = self.channels.dispatch_all(&notice).await;
        let delivered = outcomes.iter().filter(|o| o.delivered).count();

        self.store.mark_all_alerted(alert_id).await?;
        info!(
            alert_id,
            delivered,
            attempted = outcomes.len(),
            "crisis alert dispatch complete"
        );
        Ok(alert_id)
    }
}
