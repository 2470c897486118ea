//! Gradient-boosted decision forest scorer.
//!
//! The forest is trained offline (xgboost-style multi-class boosting) and
//! exported as a JSON dump of flat node arrays. Trees are assigned to
//! classes round-robin: with 3 classes, trees 0,3,6,.. accumulate into the
//! class-0 margin and so on. Prediction is arg-max over class margins.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestNode {
    /// Split feature index; -1 marks a leaf.
    pub feature: i32,
    #[serde(default)]
    pub threshold: f32,
    /// Child indices into the tree's node array; unused on leaves.
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    /// Leaf contribution to the class margin; unused on splits.
    #[serde(default)]
    pub value: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestTree {
    pub nodes: Vec<ForestNode>,
}

impl ForestTree {
    /// Walk from the root; missing-feature reads as 0.0 (dense vectors only
    /// in this pipeline, so that branch is theoretical).
    fn score(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        // Bounded by node count; malformed child links terminate at 0.0
        // rather than looping forever.
        for _ in 0..self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if node.feature < 0 {
                return node.value;
            }
            let f = features.get(node.feature as usize).copied().unwrap_or(0.0);
            idx = if f < node.threshold {
                node.left
            } else {
                node.right
            };
        }
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedForest {
    pub num_classes: usize,
    pub num_features: usize,
    #[serde(default)]
    pub base_score: f32,
    pub trees: Vec<ForestTree>,
}

impl GradientBoostedForest {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let forest: GradientBoostedForest = serde_json::from_str(&raw)?;
        forest.validate()?;
        Ok(forest)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.num_classes == 0 {
            anyhow::bail!("forest declares zero classes");
        }
        for (i, tree) in self.trees.iter().enumerate() {
            for node in &tree.nodes {
                if node.feature >= self.num_features as i32 {
                    anyhow::bail!(
                        "tree {i} splits on feature {} but forest has {} features",
                        node.feature,
                        self.num_features
                    );
                }
            }
        }
        Ok(())
    }

    /// Raw per-class margins (base score + summed leaf values).
    pub fn margins(&self, features: &[f32]) -> anyhow::Result<Vec<f32>> {
        if features.len() != self.num_features {
            anyhow::bail!(
                "feature vector has {} entries, forest expects {}",
                features.len(),
                self.num_features
            );
        }
        let mut margins = vec![self.base_score; self.num_classes];
        for (i, tree) in self.trees.iter().enumerate() {
            margins[i % self.num_classes] += tree.score(features);
        }
        Ok(margins)
    }

    /// Arg-max class index. Ties resolve to the lower class.
    pub fn predict_class(&self, features: &[f32]) -> anyhow::Result<usize> {
        let margins = self.margins(features)?;
        let mut best = 0usize;
        for (i, &m) in margins.iter().enumerate() {
            if m > margins[best] {
                best = i;
            }
        }
        Ok(best)
    }
}
