//! Fixed-vocabulary TF-IDF vectorizer.
//!
//! The vocabulary and idf weights are fitted offline alongside the
//! gradient-boosted model and shipped as a JSON dump; at runtime this only
//! transforms. Output dimension and term order must match training exactly,
//! so the vocabulary maps each term to its fixed column index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// term -> column index, fixed at fit time.
    vocabulary: HashMap<String, usize>,
    /// idf weight per column.
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let v: TfidfVectorizer = serde_json::from_str(&raw)?;
        v.validate()?;
        Ok(v)
    }

    pub fn from_parts(vocabulary: HashMap<String, usize>, idf: Vec<f32>) -> anyhow::Result<Self> {
        let v = Self { vocabulary, idf };
        v.validate()?;
        Ok(v)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let dim = self.idf.len();
        for (term, &idx) in &self.vocabulary {
            if idx >= dim {
                anyhow::bail!("vocabulary index {idx} for term {term:?} exceeds idf length {dim}");
            }
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    /// L2-normalized tf-idf vector of fixed dimension.
    pub fn transform(&self, document: &str) -> Vec<f32> {
        let mut counts = vec![0u32; self.dim()];
        let mut total = 0u32;
        for token in tokenize(document) {
            if let Some(&idx) = self.vocabulary.get(token.as_str()) {
                counts[idx] += 1;
            }
            total += 1;
        }

        let mut out = vec![0.0f32; self.dim()];
        if total == 0 {
            return out;
        }
        for (i, &c) in counts.iter().enumerate() {
            if c > 0 {
                out[i] = (c as f32 / total as f32) * self.idf[i];
            }
        }

        let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TfidfVectorizer {
        let vocab = HashMap::from([
            ("sad".to_string(), 0usize),
            ("tired".to_string(), 1),
            ("happy".to_string(), 2),
        ]);
        TfidfVectorizer::from_parts(vocab, vec![1.0, 2.0, 1.0]).unwrap()
    }

    #[test]
    fn transform_has_fixed_dimension() {
        let v = sample();
        assert_eq!(v.transform("anything at all").len(), 3);
        assert_eq!(v.transform("").len(), 3);
    }

    #[test]
    fn known_terms_land_in_their_columns() {
        let v = sample();
        let out = v.transform("so tired tired");
        assert_eq!(out[0], 0.0);
        assert!(out[1] > 0.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn output_is_l2_normalized() {
        let v = sample();
        let out = v.transform("sad and tired and happy");
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn out_of_vocabulary_text_is_all_zero() {
        let v = sample();
        assert!(v.transform("qwerty zxcvb").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn bad_vocabulary_index_is_rejected() {
        let vocab = HashMap::from([("sad".to_string(), 9usize)]);
        assert!(TfidfVectorizer::from_parts(vocab, vec![1.0]).is_err());
    }
}
