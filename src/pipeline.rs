//! End-to-end message evaluation: language handling, the keyword fast path,
//! detector fan-out, fusion, persistence, alerting and reply selection.
//!
//! The keyword scan runs first and short-circuits everything else. It is
//! the cheapest check and must complete before any expensive path, so a
//! literal self-harm statement can never be lost to a model failure or a
//! request timeout further down.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::alerts::{CrisisDispatcher, RiskSource};
use crate::config::RiskConfig;
use crate::detectors::{
    ContextualDetector, DetectorInput, DetectorSet, EnsembleDetector, RuleDetector,
    SemanticDetector, TemporalDetector,
};
use crate::engine;
use crate::history::{HistoryStore, Sender};
use crate::language::{clean_for_analysis, normalize_language, DynTranslator};
use crate::models::ModelStore;
use crate::reply::{
    generate_supportive_reply, DynReplyProvider, ReplyRequest, CRISIS_FAST_PATH_REPLY,
    CRISIS_PIPELINE_REPLY,
};
use crate::risk::{ConversationContext, RiskAssessment, RiskLabel, RiskLevel};

const MOOD_WINDOW: usize = 5;
const RISK_LABEL_WINDOW: usize = 10;
const MESSAGE_WINDOW: usize = 4;

/// What the routing layer returns to the client for one chat message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationOutcome {
    #[serde(rename = "risk_level")]
    pub risk_label: RiskLabel,
    #[serde(rename = "crisis")]
    pub is_crisis: bool,
    #[serde(rename = "trigger_appointment_popup")]
    pub trigger_alert_popup: bool,
    pub reply: String,
}

pub struct RiskPipeline {
    detectors: DetectorSet,
    history: Arc<dyn HistoryStore>,
    dispatcher: CrisisDispatcher,
    translator: DynTranslator,
    reply_provider: DynReplyProvider,
}

impl RiskPipeline {
    /// Wire the full detector bank against a shared model store.
    pub fn new(
        models: Arc<ModelStore>,
        config: &RiskConfig,
        history: Arc<dyn HistoryStore>,
        dispatcher: CrisisDispatcher,
        translator: DynTranslator,
        reply_provider: DynReplyProvider,
    ) -> Self {
        let detectors = DetectorSet {
            rule: Arc::new(RuleDetector),
            ensemble: Arc::new(EnsembleDetector::new(Arc::clone(&models))),
            contextual: Arc::new(ContextualDetector::new(Arc::clone(&models))),
            temporal: Arc::new(TemporalDetector::new(Arc::clone(&models))),
            semantic: Arc::new(SemanticDetector::with_threshold(
                models,
                config.semantic_threshold,
            )),
        };
        Self::with_detectors(detectors, history, dispatcher, translator, reply_provider)
    }

    /// Explicit detector bank; tests substitute scripted detectors here.
    pub fn with_detectors(
        detectors: DetectorSet,
        history: Arc<dyn HistoryStore>,
        dispatcher: CrisisDispatcher,
        translator: DynTranslator,
        reply_provider: DynReplyProvider,
    ) -> Self {
        Self {
            detectors,
            history,
            dispatcher,
            translator,
            reply_provider,
        }
    }

    pub fn dispatcher(&self) -> &CrisisDispatcher {
        &self.dispatcher
    }

    /// The single entry point the routing layer calls per chat message.
    pub async fn evaluate_message(
        &self,
        user_id: &str,
        role: &str,
        text: &str,
    ) -> Result<EvaluationOutcome> {
        let (lang, english) = normalize_language(text, self.translator.as_ref()).await;
        let normalized = engine::normalize(&english);

        // Keyword fast path, checked on both the English projection and the
        // original text so an untranslatable message still matches.
        if engine::contains_crisis_phrase(&normalized) || engine::contains_crisis_phrase(text) {
            self.history
                .persist_chat_turn(user_id, Sender::User, text, RiskLabel::High)
                .await?;
            self.dispatcher
                .dispatch(user_id, role, text, RiskSource::KeywordMatch)
                .await?;
            metrics::counter!("risk_fast_path_hits_total").increment(1);
            return Ok(EvaluationOutcome {
                risk_label: RiskLabel::High,
                is_crisis: true,
                trigger_alert_popup: true,
                reply: CRISIS_FAST_PATH_REPLY.to_string(),
            });
        }

        let context = self.fetch_context(user_id).await;
        let history_texts = self.english_history(&context).await;

        let input = DetectorInput {
            normalized_text: normalized,
            original_text: text.to_string(),
            history_texts,
            historical_risk_frequency: context.historical_risk_frequency(),
            mood_trend: context.mood_trend(),
        };

        let signals = self.detectors.evaluate(&input).await;
        let final_risk = engine::fuse(
            signals.rule.level,
            signals.ensemble.level,
            signals.contextual.level,
            signals.temporal.level,
            signals.semantic.level,
        );
        let assessment = RiskAssessment {
            rule_risk: signals.rule.level,
            ensemble_risk: signals.ensemble.level,
            contextual_risk: signals.contextual.level,
            temporal_risk: signals.temporal.level,
            semantic_risk: signals.semantic.level,
            semantic_match: signals.semantic.semantic_match,
            final_risk,
        };
        let label = assessment.risk_label();
        info!(
            user_id,
            lang,
            rule = assessment.rule_risk.as_index(),
            ensemble = assessment.ensemble_risk.as_index(),
            contextual = assessment.contextual_risk.as_index(),
            temporal = assessment.temporal_risk.as_index(),
            semantic = assessment.semantic_risk.as_index(),
            label = label.as_str(),
            "message assessed"
        );
        metrics::counter!("risk_assessments_total", "label" => label.as_str()).increment(1);

        self.history
            .persist_chat_turn(user_id, Sender::User, text, label)
            .await?;

        if assessment.is_crisis() {
            self.dispatcher
                .dispatch(user_id, role, text, RiskSource::Pipeline)
                .await?;
            return Ok(EvaluationOutcome {
                risk_label: RiskLabel::High,
                is_crisis: true,
                trigger_alert_popup: true,
                reply: CRISIS_PIPELINE_REPLY.to_string(),
            });
        }

        let request = ReplyRequest {
            user_text: text,
            risk_level: final_risk,
            language: &lang,
        };
        let reply = generate_supportive_reply(self.reply_provider.as_ref(), &request).await;
        self.history
            .persist_chat_turn(user_id, Sender::Bot, &reply, label)
            .await?;

        Ok(EvaluationOutcome {
            risk_label: label,
            is_crisis: false,
            trigger_alert_popup: false,
            reply,
        })
    }

    /// Recent history snapshot. Store failures fall back to an empty
    /// context, which yields the neutral defaults downstream.
    async fn fetch_context(&self, user_id: &str) -> ConversationContext {
        let moods = self.history.recent_moods(user_id, MOOD_WINDOW).await;
        let labels = self
            .history
            .recent_risk_labels(user_id, RISK_LABEL_WINDOW)
            .await;
        let messages = self.history.recent_messages(user_id, MESSAGE_WINDOW).await;

        match (moods, labels, messages) {
            (Ok(moods), Ok(labels), Ok(messages)) => ConversationContext {
                recent_mood_scores: moods.iter().map(|m| m.score).collect(),
                recent_risk_labels: labels,
                recent_message_texts: messages,
            },
            (moods, labels, messages) => {
                let err = [
                    moods.err().map(|e| e.to_string()),
                    labels.err().map(|e| e.to_string()),
                    messages.err().map(|e| e.to_string()),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("; ");
                warn!(user_id, error = %err, "context fetch failed, using defaults");
                ConversationContext::default()
            }
        }
    }

    /// History texts for the temporal detector: most-recent-first from the
    /// store, translated best-effort, cleaned, and reversed to oldest-first.
    async fn english_history(&self, context: &ConversationContext) -> Vec<String> {
        let mut texts = Vec::with_capacity(context.recent_message_texts.len());
        for raw in context.recent_message_texts.iter().rev() {
            let (_, english) = normalize_language(raw, self.translator.as_ref()).await;
            let cleaned = clean_for_analysis(&engine::normalize(&english));
            if cleaned.is_empty() {
                texts.push(engine::normalize(&english));
            } else {
                texts.push(cleaned);
            }
        }
        texts
    }
}
