//! risk.rs — Core types for the risk-scoring pipeline: severity scale,
//! per-detector outputs, and the per-message assessment shape.
//!
//! A `RiskAssessment` exists only for the duration of one evaluation; only
//! its final label survives into the chat history.

use serde::{Deserialize, Serialize};

/// Internal severity scale. Ordered so that `max` over detector outputs is
/// the escalation-favoring fusion primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// The wire label stored in chat history and returned to clients.
    pub fn as_label(self) -> RiskLabel {
        match self {
            RiskLevel::Low => RiskLabel::Low,
            RiskLevel::Medium => RiskLabel::Medium,
            RiskLevel::High => RiskLabel::High,
        }
    }

    pub fn as_index(self) -> usize {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    /// Map a model class index to a level. Out-of-range indices clamp to Low,
    /// never to High: a malformed model output must not page a counselor.
    pub fn from_class_index(idx: usize) -> Self {
        match idx {
            1 => RiskLevel::Medium,
            2 => RiskLevel::High,
            _ => RiskLevel::Low,
        }
    }
}

/// One of the three fixed label strings exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic attachment from the semantic detector: which anchor sentence
/// the message most resembled, and how closely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub anchor: String,
    pub similarity: f32,
}

/// Everything one evaluation produced, kept for observability until the
/// final label has been persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub rule_risk: RiskLevel,
    pub ensemble_risk: RiskLevel,
    pub contextual_risk: RiskLevel,
    pub temporal_risk: RiskLevel,
    pub semantic_risk: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_match: Option<SemanticMatch>,
    pub final_risk: RiskLevel,
}

impl RiskAssessment {
    pub fn risk_label(&self) -> RiskLabel {
        self.final_risk.as_label()
    }

    pub fn is_crisis(&self) -> bool {
        self.final_risk == RiskLevel::High
    }
}

/// Read-only snapshot of a user's recent history, fetched once per
/// evaluation. Sequences are most-recent-first as the store returns them.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub recent_mood_scores: Vec<i32>,
    pub recent_risk_labels: Vec<RiskLabel>,
    pub recent_message_texts: Vec<String>,
}

/// Neutral mood used when a user has no mood history at all.
pub const DEFAULT_MOOD_TREND: f32 = 7.0;

impl ConversationContext {
    /// Mean of the last self-reported mood scores, or the neutral default.
    pub fn mood_trend(&self) -> f32 {
        if self.recent_mood_scores.is_empty() {
            return DEFAULT_MOOD_TREND;
        }
        let sum: i32 = self.recent_mood_scores.iter().sum();
        sum as f32 / self.recent_mood_scores.len() as f32
    }

    /// Fraction of recent chat turns labeled high, 0.0 without history.
    pub fn historical_risk_frequency(&self) -> f32 {
        if self.recent_risk_labels.is_empty() {
            return 0.0;
        }
        let high = self
            .recent_risk_labels
            .iter()
            .filter(|l| **l == RiskLabel::High)
            .count();
        high as f32 / self.recent_risk_labels.len() as f32
    }
}
