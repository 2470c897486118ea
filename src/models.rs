//! Model artifact store: lazy, once-only loading of every trained resource
//! the detectors share, cached process-wide for the process lifetime.
//!
//! Layout under the models directory (all weights are safetensors dumps
//! produced by offline training):
//!
//! ```text
//! models/
//!   embedder/            tokenizer.json, config.json, model.safetensors
//!   bert-risk/           tokenizer.json, config.json, model.safetensors
//!   distilbert-risk/     tokenizer.json, config.json, model.safetensors
//!   temporal/            config.json, model.safetensors
//!   contextual/          tfidf.json, forest.json
//! ```
//!
//! Loading takes seconds, so nothing loads at startup; the first request
//! that needs a family triggers its load exactly once (`OnceCell`), and
//! concurrent first-requests wait on the same initialization. Everything
//! runs on CPU for determinism in constrained deployments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{lstm, Linear, Module, VarBuilder, LSTM, LSTMConfig, RNN};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationDirection};
use tokio::sync::OnceCell;
use tracing::info;

use crate::gbdt::GradientBoostedForest;
use crate::tfidf::TfidfVectorizer;

const EMBED_MAX_LENGTH: usize = 96;
const CLASSIFY_MAX_LENGTH: usize = 128;

pub struct ModelStore {
    dir: PathBuf,
    embedder: OnceCell<Arc<TextEmbedder>>,
    ensemble: OnceCell<Arc<EnsemblePair>>,
    temporal: OnceCell<Arc<TemporalNet>>,
    contextual: OnceCell<Arc<ContextualArtifacts>>,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            embedder: OnceCell::new(),
            ensemble: OnceCell::new(),
            temporal: OnceCell::new(),
            contextual: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared sentence encoder (semantic + temporal detectors).
    pub async fn embedder(&self) -> Result<Arc<TextEmbedder>> {
        let dir = self.dir.join("embedder");
        self.embedder
            .get_or_try_init(|| async move {
                let e = tokio::task::spawn_blocking(move || TextEmbedder::load(&dir))
                    .await
                    .context("embedder load task panicked")??;
                Ok::<_, anyhow::Error>(Arc::new(e))
            })
            .await
            .map(Arc::clone)
    }

    /// The two independently trained ensemble classifiers.
    pub async fn ensemble(&self) -> Result<Arc<EnsemblePair>> {
        let bert_dir = self.dir.join("bert-risk");
        let distil_dir = self.dir.join("distilbert-risk");
        self.ensemble
            .get_or_try_init(|| async move {
                let pair = tokio::task::spawn_blocking(move || {
                    let bert = BertRiskClassifier::load(&bert_dir)?;
                    let distil = DistilBertRiskClassifier::load(&distil_dir)?;
                    Ok::<_, anyhow::Error>(EnsemblePair { bert, distil })
                })
                .await
                .context("ensemble load task panicked")??;
                Ok::<_, anyhow::Error>(Arc::new(pair))
            })
            .await
            .map(Arc::clone)
    }

    /// LSTM head over embedding sequences.
    pub async fn temporal(&self) -> Result<Arc<TemporalNet>> {
        let dir = self.dir.join("temporal");
        self.temporal
            .get_or_try_init(|| async move {
                let net = tokio::task::spawn_blocking(move || TemporalNet::load(&dir))
                    .await
                    .context("temporal load task panicked")??;
                Ok::<_, anyhow::Error>(Arc::new(net))
            })
            .await
            .map(Arc::clone)
    }

    /// TF-IDF vectorizer + gradient-boosted forest for the contextual detector.
    pub async fn contextual(&self) -> Result<Arc<ContextualArtifacts>> {
        let dir = self.dir.join("contextual");
        self.contextual
            .get_or_try_init(|| async move {
                let art = tokio::task::spawn_blocking(move || {
                    let tfidf = TfidfVectorizer::from_path(&dir.join("tfidf.json"))
                        .context("load tfidf.json")?;
                    let forest = GradientBoostedForest::from_path(&dir.join("forest.json"))
                        .context("load forest.json")?;
                    Ok::<_, anyhow::Error>(ContextualArtifacts { tfidf, forest })
                })
                .await
                .context("contextual load task panicked")??;
                Ok::<_, anyhow::Error>(Arc::new(art))
            })
            .await
            .map(Arc::clone)
    }
}

pub struct ContextualArtifacts {
    pub tfidf: TfidfVectorizer,
    pub forest: GradientBoostedForest,
}

pub struct EnsemblePair {
    pub bert: BertRiskClassifier,
    pub distil: DistilBertRiskClassifier,
}

// ---- loading helpers ----

fn load_tokenizer(model_path: &Path) -> Result<Tokenizer> {
    let path = model_path.join("tokenizer.json");
    Tokenizer::from_file(&path)
        .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn load_var_builder(model_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let weights_path = model_path.join("model.safetensors");
    if !weights_path.exists() {
        return Err(anyhow!(
            "model.safetensors not found in {}",
            model_path.display()
        ));
    }
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
            .map_err(|e| anyhow!("failed to load weights: {e}"))?
    };
    Ok(vb)
}

fn parse_json_config<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

/// Checkpoints exported from different toolchains prefix the backbone
/// differently; try the usual prefixes in order.
fn load_bert_backbone(vb: &VarBuilder, config: &BertConfig) -> Result<BertModel> {
    let mut errors = Vec::new();
    for prefix in ["bert", ""] {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(prefix)
        };
        match BertModel::load(vb_prefix, config) {
            Ok(model) => return Ok(model),
            Err(e) => errors.push(format!(
                "{}: {e}",
                if prefix.is_empty() { "<root>" } else { prefix }
            )),
        }
    }
    Err(anyhow!(
        "failed to load BERT backbone with tried prefixes [{}]",
        errors.join(" | ")
    ))
}

fn softmax_vec(logits: &Tensor) -> Result<Vec<f32>> {
    let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
    let probs = probs.squeeze(0)?;
    Ok(probs.to_vec1()?)
}

// ---- sentence encoder ----

/// Pretrained language encoder producing a fixed-dimension embedding per
/// text (first/pooled hidden-state token).
pub struct TextEmbedder {
    tokenizer: Tokenizer,
    model: BertModel,
    device: Device,
    hidden_size: usize,
}

impl TextEmbedder {
    pub fn load(model_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let tokenizer = load_tokenizer(model_path)?;
        let config: BertConfig = parse_json_config(&model_path.join("config.json"))?;
        let hidden_size = config.hidden_size;
        let vb = load_var_builder(model_path, &device)?;
        let model = load_bert_backbone(&vb, &config)?;
        info!(path = %model_path.display(), hidden_size, "loaded sentence encoder");
        Ok(Self {
            tokenizer,
            model,
            device,
            hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// First-token embedding of `text`.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;
        encoding.truncate(EMBED_MAX_LENGTH, 0, TruncationDirection::Right);

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let hidden_states = self.model.forward(&input_ids, &token_type_ids, None)?;
        let cls = hidden_states.i((0, 0, ..))?;
        Ok(cls.to_vec1()?)
    }
}

// ---- ensemble classifiers ----

/// BERT-family sequence classifier: backbone + linear head over the CLS token.
pub struct BertRiskClassifier {
    tokenizer: Tokenizer,
    model: BertModel,
    classifier: Linear,
    device: Device,
}

impl BertRiskClassifier {
    pub fn load(model_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let tokenizer = load_tokenizer(model_path)?;
        let config: BertConfig = parse_json_config(&model_path.join("config.json"))?;
        let vb = load_var_builder(model_path, &device)?;
        let model = load_bert_backbone(&vb, &config)?;
        let classifier = candle_nn::linear(config.hidden_size, 3, vb.pp("classifier"))
            .map_err(|e| anyhow!("failed to load classification head: {e}"))?;
        info!(path = %model_path.display(), "loaded BERT risk classifier");
        Ok(Self {
            tokenizer,
            model,
            classifier,
            device,
        })
    }

    /// 3-class probability vector.
    pub fn probs(&self, text: &str) -> Result<Vec<f32>> {
        let mut encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;
        encoding.truncate(CLASSIFY_MAX_LENGTH, 0, TruncationDirection::Right);

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let hidden_states = self.model.forward(&input_ids, &token_type_ids, None)?;
        let cls = hidden_states.i((0, 0, ..))?.unsqueeze(0)?;
        let logits = self.classifier.forward(&cls)?;
        softmax_vec(&logits)
    }
}

/// DistilBERT sequence classifier: backbone + pre-classifier + head.
pub struct DistilBertRiskClassifier {
    tokenizer: Tokenizer,
    model: DistilBertModel,
    pre_classifier: Option<Linear>,
    classifier: Linear,
    device: Device,
}

impl DistilBertRiskClassifier {
    pub fn load(model_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let tokenizer = load_tokenizer(model_path)?;
        let config: DistilBertConfig = parse_json_config(&model_path.join("config.json"))?;

        // DistilBERT configs name the hidden width inconsistently.
        let raw: serde_json::Value = parse_json_config(&model_path.join("config.json"))?;
        let hidden_size = raw
            .get("dim")
            .or_else(|| raw.get("hidden_dim"))
            .or_else(|| raw.get("hidden_size"))
            .and_then(|v| v.as_u64())
            .unwrap_or(768) as usize;

        let vb = load_var_builder(model_path, &device)?;
        let model = DistilBertModel::load(vb.pp("distilbert"), &config)
            .map_err(|e| anyhow!("failed to load DistilBERT backbone: {e}"))?;
        let pre_classifier =
            candle_nn::linear(hidden_size, hidden_size, vb.pp("pre_classifier")).ok();
        let classifier = candle_nn::linear(hidden_size, 3, vb.pp("classifier"))
            .map_err(|e| anyhow!("failed to load classification head: {e}"))?;
        info!(path = %model_path.display(), "loaded DistilBERT risk classifier");
        Ok(Self {
            tokenizer,
            model,
            pre_classifier,
            classifier,
            device,
        })
    }

    /// 3-class probability vector.
    pub fn probs(&self, text: &str) -> Result<Vec<f32>> {
        let mut encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;
        encoding.truncate(CLASSIFY_MAX_LENGTH, 0, TruncationDirection::Right);

        let input_ids_i64: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let input_ids = Tensor::new(input_ids_i64.as_slice(), &self.device)?.unsqueeze(0)?;

        // DistilBERT's candle port expects the mask inverted (1 = padding).
        let mask_inverted: Vec<u8> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| if x == 0 { 1u8 } else { 0u8 })
            .collect();
        let attention_mask = Tensor::new(mask_inverted.as_slice(), &self.device)?.unsqueeze(0)?;

        let hidden_states = self.model.forward(&input_ids, &attention_mask)?;
        let cls = hidden_states.i((0, 0, ..))?.unsqueeze(0)?;

        let pooled = match &self.pre_classifier {
            Some(pre) => pre.forward(&cls)?.relu()?,
            None => cls,
        };
        let logits = self.classifier.forward(&pooled)?;
        softmax_vec(&logits)
    }
}

// ---- temporal sequence model ----

#[derive(Debug, Deserialize)]
struct TemporalConfig {
    input_dim: usize,
    hidden_dim: usize,
    num_classes: usize,
}

/// Single-direction, single-layer LSTM over a sequence of text embeddings,
/// final hidden state projected to class logits.
pub struct TemporalNet {
    lstm: LSTM,
    head: Linear,
    input_dim: usize,
    device: Device,
}

impl TemporalNet {
    pub fn load(model_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let config: TemporalConfig = parse_json_config(&model_path.join("config.json"))?;
        let vb = load_var_builder(model_path, &device)?;
        let lstm_net = lstm(
            config.input_dim,
            config.hidden_dim,
            LSTMConfig::default(),
            vb.pp("lstm"),
        )
        .map_err(|e| anyhow!("failed to load LSTM weights: {e}"))?;
        let head = candle_nn::linear(config.hidden_dim, config.num_classes, vb.pp("fc"))
            .map_err(|e| anyhow!("failed to load projection head: {e}"))?;
        info!(
            path = %model_path.display(),
            input_dim = config.input_dim,
            hidden_dim = config.hidden_dim,
            "loaded temporal sequence model"
        );
        Ok(Self {
            lstm: lstm_net,
            head,
            input_dim: config.input_dim,
            device,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Class index for one embedding sequence (oldest step first).
    pub fn predict(&self, sequence: &[Vec<f32>]) -> Result<usize> {
        if sequence.is_empty() {
            return Err(anyhow!("empty embedding sequence"));
        }
        for step in sequence {
            if step.len() != self.input_dim {
                return Err(anyhow!(
                    "embedding dimension {} does not match model input {}",
                    step.len(),
                    self.input_dim
                ));
            }
        }

        let seq_len = sequence.len();
        let flat: Vec<f32> = sequence.iter().flatten().copied().collect();
        let input = Tensor::from_vec(flat, (1, seq_len, self.input_dim), &self.device)?;

        let states = self.lstm.seq(&input)?;
        let last = states
            .last()
            .ok_or_else(|| anyhow!("LSTM produced no states"))?;
        let logits = self.head.forward(last.h())?;
        let probs = softmax_vec(&logits)?;

        let mut best = 0usize;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[best] {
                best = i;
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_artifacts_surface_as_errors() {
        let store = ModelStore::new("/nonexistent/models");
        assert!(store.embedder().await.is_err());
        assert!(store.ensemble().await.is_err());
        assert!(store.temporal().await.is_err());
        assert!(store.contextual().await.is_err());
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_call() {
        // OnceCell stays empty after an error, so a later call (after the
        // artifacts appear) can still succeed.
        let store = ModelStore::new("/nonexistent/models");
        assert!(store.contextual().await.is_err());
        assert!(store.contextual().await.is_err());
    }
}
