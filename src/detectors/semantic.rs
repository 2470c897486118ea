//! Similarity detector: compares the message embedding against fixed
//! crisis anchor sentences. Returns High only above the configured cosine
//! threshold, with the best anchor attached for observability. Never
//! returns Medium.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::models::{ModelStore, TextEmbedder};
use crate::risk::{RiskLevel, SemanticMatch};

use super::{Detection, Detector, DetectorInput};

pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// Exemplar crisis sentences. Versioned with the code; changing them
/// changes detector behavior and needs review.
pub const HIGH_RISK_ANCHORS: &[&str] = &[
    "I want to end my life",
    "I wish I was dead",
    "I don't want to exist anymore",
    "Life is not worth living",
    "I feel like dying",
];

pub struct SemanticDetector {
    store: Arc<ModelStore>,
    threshold: f32,
    anchor_embeddings: OnceCell<Arc<Vec<Vec<f32>>>>,
}

impl SemanticDetector {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self::with_threshold(store, SIMILARITY_THRESHOLD)
    }

    pub fn with_threshold(store: Arc<ModelStore>, threshold: f32) -> Self {
        Self {
            store,
            threshold,
            anchor_embeddings: OnceCell::new(),
        }
    }

    /// Anchor embeddings are computed once per process and reused.
    async fn anchors(&self, embedder: &Arc<TextEmbedder>) -> Result<Arc<Vec<Vec<f32>>>> {
        self.anchor_embeddings
            .get_or_try_init(|| async {
                let embedder = Arc::clone(embedder);
                let embedded = tokio::task::spawn_blocking(move || {
                    HIGH_RISK_ANCHORS
                        .iter()
                        .map(|a| embedder.embed(a))
                        .collect::<Result<Vec<_>>>()
                })
                .await
                .map_err(|e| anyhow!("anchor embedding task panicked: {e}"))??;
                Ok::<_, anyhow::Error>(Arc::new(embedded))
            })
            .await
            .map(Arc::clone)
    }
}

#[async_trait]
impl Detector for SemanticDetector {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn detect(&self, input: &DetectorInput) -> Result<Detection> {
        let embedder = self.store.embedder().await?;
        let anchors = self.anchors(&embedder).await?;

        let text = input.normalized_text.clone();
        let embedder_for_text = Arc::clone(&embedder);
        let text_embedding =
            tokio::task::spawn_blocking(move || embedder_for_text.embed(&text))
                .await
                .map_err(|e| anyhow!("embedding task panicked: {e}"))??;

        let mut best_idx = 0usize;
        let mut best_score = f32::MIN;
        for (i, anchor) in anchors.iter().enumerate() {
            let score = cosine_similarity(&text_embedding, anchor);
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        let level = if best_score >= self.threshold {
            RiskLevel::High
        } else {
            RiskLevel::Low
        };
        Ok(Detection {
            level,
            semantic_match: Some(SemanticMatch {
                anchor: HIGH_RISK_ANCHORS[best_idx].to_string(),
                similarity: best_score,
            }),
        })
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -1.2, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn missing_embedder_surfaces_as_error() {
        let store = Arc::new(ModelStore::new("/nonexistent/models"));
        let d = SemanticDetector::new(store);
        let out = d.detect(&DetectorInput::from_text("hello")).await;
        assert!(out.is_err());
    }
}
