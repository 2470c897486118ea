// src/config.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_semantic_threshold() -> f32 {
    0.85
}

fn default_reply_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Root directory of the trained model artifacts.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Cosine similarity cutoff for the semantic detector, in [0, 1].
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub enabled: bool,
    /// Override for self-hosted gateways; `None` uses the public endpoint.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    pub enabled: bool,
    /// Chat-completion endpoint of the companion reply provider.
    pub endpoint: String,
    #[serde(default = "default_reply_model")]
    pub model: String,
    /// "ENV" means: read from REPLY_API_KEY.
    pub api_key: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            model: default_reply_model(),
            api_key: String::new(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            semantic_threshold: default_semantic_threshold(),
            translation: TranslationConfig::default(),
            reply: ReplyConfig::default(),
        }
    }
}

impl RiskConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: RiskConfig = serde_json::from_str(&data)?;

        // Resolve reply api key if "ENV"
        if cfg.reply.enabled && cfg.reply.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.reply.api_key = env::var("REPLY_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing REPLY_API_KEY env var"))?;
        }

        // Sanitize threshold
        if !(0.0..=1.0).contains(&cfg.semantic_threshold) {
            cfg.semantic_threshold = default_semantic_threshold();
        }

        Ok(cfg)
    }

    /// `RISK_CONFIG_PATH` if set, else `config/risk.json` if present, else
    /// built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = env::var("RISK_CONFIG_PATH") {
            return Self::load_from_file(path);
        }
        let default_path = Path::new("config/risk.json");
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }
        Ok(Self::default())
    }
}
