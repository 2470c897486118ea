//! Contextual tabular classifier: TF-IDF text features concatenated with
//! sentiment polarity, character length, historical risk frequency and the
//! recent mood trend, scored by a gradient-boosted forest.
//!
//! Feature order is fixed at training time. Reordering anything here without
//! retraining silently corrupts predictions, which is why assembly lives in
//! one function with a unit test pinning the layout.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ModelStore;
use crate::risk::RiskLevel;
use crate::sentiment::SentimentAnalyzer;
use crate::tfidf::TfidfVectorizer;

use super::{Detection, Detector, DetectorInput};

pub struct ContextualDetector {
    store: Arc<ModelStore>,
    sentiment: SentimentAnalyzer,
}

impl ContextualDetector {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self {
            store,
            sentiment: SentimentAnalyzer::new(),
        }
    }
}

#[async_trait]
impl Detector for ContextualDetector {
    fn name(&self) -> &'static str {
        "contextual"
    }

    async fn detect(&self, input: &DetectorInput) -> Result<Detection> {
        let artifacts = self.store.contextual().await?;
        let polarity = self.sentiment.polarity(&input.normalized_text);
        let features = build_features(
            &artifacts.tfidf,
            &input.normalized_text,
            polarity,
            input.historical_risk_frequency,
            input.mood_trend,
        );

        let text_len = input.normalized_text.chars().count();
        let class = tokio::task::spawn_blocking(move || artifacts.forest.predict_class(&features))
            .await
            .map_err(|e| anyhow!("forest scoring task panicked: {e}"))??;

        tracing::debug!(class, text_len, "contextual classifier scored message");
        Ok(Detection::level(RiskLevel::from_class_index(class)))
    }
}

/// Training-time feature layout: [tfidf.. , polarity, char_len,
/// historical_risk_frequency, mood_trend].
pub fn build_features(
    tfidf: &TfidfVectorizer,
    text: &str,
    polarity: f32,
    historical_risk_frequency: f32,
    mood_trend: f32,
) -> Vec<f32> {
    let mut features = tfidf.transform(text);
    features.push(polarity);
    features.push(text.chars().count() as f32);
    features.push(historical_risk_frequency);
    features.push(mood_trend);
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tiny_vectorizer() -> TfidfVectorizer {
        let mut vocab = HashMap::new();
        vocab.insert("sad".to_string(), 0);
        vocab.insert("day".to_string(), 1);
        TfidfVectorizer::from_parts(vocab, vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn feature_layout_is_tfidf_then_scalars() {
        let v = tiny_vectorizer();
        let f = build_features(&v, "sad day", -0.4, 0.3, 6.5);
        assert_eq!(f.len(), v.dim() + 4);
        assert!((f[v.dim()] - -0.4).abs() < 1e-6);
        assert!((f[v.dim() + 1] - 7.0).abs() < 1e-6);
        assert!((f[v.dim() + 2] - 0.3).abs() < 1e-6);
        assert!((f[v.dim() + 3] - 6.5).abs() < 1e-6);
    }

    #[test]
    fn length_feature_counts_chars_not_bytes() {
        let v = tiny_vectorizer();
        let f = build_features(&v, "héllo", 0.0, 0.0, 7.0);
        assert!((f[v.dim() + 1] - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_artifacts_surface_as_error() {
        let store = Arc::new(ModelStore::new("/nonexistent/models"));
        let d = ContextualDetector::new(store);
        assert!(d.detect(&DetectorInput::from_text("hi")).await.is_err());
    }
}
