//! Temporal detector: the only one with cross-turn memory. The last few
//! conversation texts plus the current message are embedded individually
//! and run through a recurrent model that picks up escalation across turns.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ModelStore;
use crate::risk::RiskLevel;

use super::{Detection, Detector, DetectorInput};

/// Fixed sequence width the recurrent model was trained on.
pub const SEQUENCE_LEN: usize = 5;

/// How many history turns feed the sequence before the current message.
pub const HISTORY_WINDOW: usize = SEQUENCE_LEN - 1;

pub struct TemporalDetector {
    store: Arc<ModelStore>,
}

impl TemporalDetector {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Detector for TemporalDetector {
    fn name(&self) -> &'static str {
        "temporal"
    }

    async fn detect(&self, input: &DetectorInput) -> Result<Detection> {
        let sequence = build_sequence(&input.history_texts, &input.normalized_text);

        let embedder = self.store.embedder().await?;
        let net = self.store.temporal().await?;

        let class = tokio::task::spawn_blocking(move || {
            let embeddings = sequence
                .iter()
                .map(|t| embedder.embed(t))
                .collect::<Result<Vec<_>>>()?;
            net.predict(&embeddings)
        })
        .await
        .map_err(|e| anyhow!("temporal inference task panicked: {e}"))??;

        Ok(Detection::level(RiskLevel::from_class_index(class)))
    }
}

/// Assemble the fixed-width text sequence: up to [`HISTORY_WINDOW`] most
/// recent history turns (oldest first) followed by the current message.
/// Short sequences are left-padded by repeating the earliest text, so the
/// model never sees synthetic zero rows that would bias it toward low risk.
pub fn build_sequence(history_oldest_first: &[String], current: &str) -> Vec<String> {
    let tail_start = history_oldest_first.len().saturating_sub(HISTORY_WINDOW);
    let mut seq: Vec<String> = history_oldest_first[tail_start..].to_vec();
    seq.push(current.to_string());

    let earliest = seq[0].clone();
    while seq.len() < SEQUENCE_LEN {
        seq.insert(0, earliest.clone());
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_history_repeats_current_message() {
        let seq = build_sequence(&[], "help");
        assert_eq!(seq, texts(&["help", "help", "help", "help", "help"]));
    }

    #[test]
    fn partial_history_left_pads_with_earliest() {
        let seq = build_sequence(&texts(&["a", "b"]), "c");
        assert_eq!(seq, texts(&["a", "a", "a", "b", "c"]));
    }

    #[test]
    fn full_history_keeps_only_the_most_recent_window() {
        let seq = build_sequence(&texts(&["a", "b", "c", "d", "e", "f"]), "g");
        assert_eq!(seq, texts(&["c", "d", "e", "f", "g"]));
        assert_eq!(seq.len(), SEQUENCE_LEN);
    }

    #[test]
    fn exact_window_needs_no_padding() {
        let seq = build_sequence(&texts(&["a", "b", "c", "d"]), "e");
        assert_eq!(seq, texts(&["a", "b", "c", "d", "e"]));
    }

    #[tokio::test]
    async fn missing_models_surface_as_error() {
        let store = Arc::new(ModelStore::new("/nonexistent/models"));
        let d = TemporalDetector::new(store);
        assert!(d.detect(&DetectorInput::from_text("hi")).await.is_err());
    }
}
