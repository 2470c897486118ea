//! Independent risk detectors and the fan-out that runs them.
//!
//! Each detector looks at one slice of the evidence (keywords, semantics,
//! transformer ensemble, contextual features, temporal drift) and returns a
//! [`Detection`]. The [`DetectorSet`] runs all five concurrently and keeps
//! the pipeline alive when individual detectors fail: a failed detector
//! contributes the neutral low signal and the failure is logged and counted.

mod contextual;
mod ensemble;
mod rule;
mod semantic;
mod temporal;

pub use contextual::ContextualDetector;
pub use ensemble::EnsembleDetector;
pub use rule::RuleDetector;
pub use semantic::SemanticDetector;
pub use temporal::TemporalDetector;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::risk::{RiskLevel, SemanticMatch};

/// Evidence shared by every detector for one message.
#[derive(Debug, Clone)]
pub struct DetectorInput {
    /// English, lowercase-insensitive analysis text (post language handling).
    pub normalized_text: String,
    /// Message exactly as the student sent it.
    pub original_text: String,
    /// Prior conversation texts, oldest first, current message excluded.
    pub history_texts: Vec<String>,
    /// Fraction of recent turns labelled high risk, in [0, 1].
    pub historical_risk_frequency: f32,
    /// Mean of recent mood check-ins on the 1..=10 scale.
    pub mood_trend: f32,
}

impl DetectorInput {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            normalized_text: text.clone(),
            original_text: text,
            history_texts: Vec::new(),
            historical_risk_frequency: 0.0,
            mood_trend: crate::risk::DEFAULT_MOOD_TREND,
        }
    }
}

/// One detector's verdict.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub level: RiskLevel,
    /// Semantic detector only: the anchor that crossed the threshold.
    pub semantic_match: Option<SemanticMatch>,
}

impl Detection {
    pub fn low() -> Self {
        Self::default()
    }

    pub fn level(level: RiskLevel) -> Self {
        Self {
            level,
            semantic_match: None,
        }
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, input: &DetectorInput) -> Result<Detection>;
}

/// Raw detector signals for one message, before fusion.
#[derive(Debug, Clone, Default)]
pub struct DetectorSignals {
    pub rule: Detection,
    pub ensemble: Detection,
    pub contextual: Detection,
    pub temporal: Detection,
    pub semantic: Detection,
}

/// The full detector bank. Fields are public so tests can substitute
/// scripted detectors.
pub struct DetectorSet {
    pub rule: Arc<dyn Detector>,
    pub ensemble: Arc<dyn Detector>,
    pub contextual: Arc<dyn Detector>,
    pub temporal: Arc<dyn Detector>,
    pub semantic: Arc<dyn Detector>,
}

impl DetectorSet {
    /// Run every detector concurrently. Individual failures degrade to the
    /// low signal so one broken model never blocks an assessment.
    pub async fn evaluate(&self, input: &DetectorInput) -> DetectorSignals {
        let (rule, ensemble, contextual, temporal, semantic) = tokio::join!(
            self.rule.detect(input),
            self.ensemble.detect(input),
            self.contextual.detect(input),
            self.temporal.detect(input),
            self.semantic.detect(input),
        );

        DetectorSignals {
            rule: Self::settle(self.rule.name(), rule),
            ensemble: Self::settle(self.ensemble.name(), ensemble),
            contextual: Self::settle(self.contextual.name(), contextual),
            temporal: Self::settle(self.temporal.name(), temporal),
            semantic: Self::settle(self.semantic.name(), semantic),
        }
    }

    fn settle(name: &'static str, result: Result<Detection>) -> Detection {
        match result {
            Ok(d) => d,
            Err(e) => {
                warn!(detector = name, error = %e, "detector failed, using low signal");
                metrics::counter!("risk_detector_failures_total", "detector" => name)
                    .increment(1);
                Detection::low()
            }
        }
    }
}
