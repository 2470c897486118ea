//! Transformer ensemble: two independently trained classifiers, equal-weight
//! probability averaging, arg-max over the mean.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ModelStore;
use crate::risk::RiskLevel;

use super::{Detection, Detector, DetectorInput};

pub struct EnsembleDetector {
    store: Arc<ModelStore>,
}

impl EnsembleDetector {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Detector for EnsembleDetector {
    fn name(&self) -> &'static str {
        "ensemble"
    }

    async fn detect(&self, input: &DetectorInput) -> Result<Detection> {
        let pair = self.store.ensemble().await?;
        let text = input.normalized_text.clone();

        let (bert_probs, distil_probs) = tokio::task::spawn_blocking(move || {
            let b = pair.bert.probs(&text)?;
            let d = pair.distil.probs(&text)?;
            Ok::<_, anyhow::Error>((b, d))
        })
        .await
        .map_err(|e| anyhow!("ensemble inference task panicked: {e}"))??;

        let class = argmax_of_mean(&bert_probs, &distil_probs)?;
        Ok(Detection::level(RiskLevel::from_class_index(class)))
    }
}

/// Arg-max of the element-wise mean of two probability vectors. Ties go to
/// the lower class.
pub fn argmax_of_mean(a: &[f32], b: &[f32]) -> Result<usize> {
    if a.len() != b.len() || a.is_empty() {
        return Err(anyhow!(
            "probability vectors disagree in length ({} vs {})",
            a.len(),
            b.len()
        ));
    }
    let mut best = 0usize;
    let mut best_val = f32::MIN;
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let mean = (x + y) / 2.0;
        if mean > best_val {
            best_val = mean;
            best = i;
        }
    }
    Ok(best)
}
