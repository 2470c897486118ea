//! Language handling: script-based detection, English normalization via an
//! external translation provider, and cleanup of partially translated text.
//!
//! Detection is a coarse character-range heuristic: it classifies by the
//! first recognized script block and calls Romanized/code-mixed text
//! English. Good enough for routing to the translator; not a language
//! identification model.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Ordered script checks; the first block with any hit wins.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        return "hi";
    }
    if text.chars().any(|c| ('\u{0C80}'..='\u{0CFF}').contains(&c)) {
        return "kn";
    }
    if text.chars().any(|c| ('\u{0B80}'..='\u{0BFF}').contains(&c)) {
        return "ta";
    }
    "en"
}

static ASCII_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+$").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Drop tokens that are not plain ASCII-letter words. Translation sometimes
/// leaves Romanized source words behind, and those confuse models trained on
/// English corpora only.
pub fn clean_for_analysis(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| {
            let lowered = word.to_lowercase();
            let stripped = NON_WORD.replace_all(&lowered, "");
            !stripped.is_empty() && ASCII_WORD.is_match(&stripped)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// External translation collaborator. Best-effort: `None` means "use the
/// original text".
pub trait Translator: Send + Sync {
    fn translate_to_english<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynTranslator = Arc<dyn Translator>;

/// Returns `None` always; used when translation is switched off.
pub struct DisabledTranslator;

impl Translator for DisabledTranslator {
    fn translate_to_english<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed text-to-text mapping for tests and local runs.
#[derive(Default)]
pub struct MockTranslator {
    map: HashMap<String, String>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.map.insert(from.into(), to.into());
        self
    }
}

impl Translator for MockTranslator {
    fn translate_to_english<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.map.get(text).cloned();
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// HTTP translation provider. Targets the public translate endpoint used by
/// the original deployment; the endpoint is configurable for self-hosted
/// gateways.
pub struct HttpTranslator {
    http: reqwest::Client,
    endpoint: String,
}

pub const DEFAULT_TRANSLATE_ENDPOINT: &str =
    "https://translate.googleapis.com/translate_a/single";

impl HttpTranslator {
    pub fn new(endpoint: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("psynova-risk-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.unwrap_or(DEFAULT_TRANSLATE_ENDPOINT).to_string(),
        }
    }

    async fn fetch(&self, text: &str) -> Option<String> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", "en"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }

        // Body shape: [[["translated","original",..],..],..]
        let body: serde_json::Value = resp.json().await.ok()?;
        let segments = body.get(0)?.as_array()?;
        let mut out = String::new();
        for seg in segments {
            if let Some(part) = seg.get(0).and_then(|v| v.as_str()) {
                out.push_str(part);
            }
        }
        let out = out.trim().to_string();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

impl Translator for HttpTranslator {
    fn translate_to_english<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(self.fetch(text))
    }
    fn provider_name(&self) -> &'static str {
        "http"
    }
}

/// Detect the language and produce the English projection the models see.
///
/// Never fails: on any translation problem the original text passes through
/// unchanged with a warning, so normalization cannot block the pipeline.
pub async fn normalize_language(text: &str, translator: &dyn Translator) -> (String, String) {
    let lang = detect_language(text);
    if lang == "en" {
        return (lang.to_string(), text.to_string());
    }

    match translator.translate_to_english(text).await {
        Some(english) => (lang.to_string(), english),
        None => {
            warn!(
                provider = translator.provider_name(),
                lang, "translation unavailable, falling back to original text"
            );
            (lang.to_string(), text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_devanagari_as_hindi() {
        assert_eq!(detect_language("मैं ठीक हूँ"), "hi");
    }

    #[test]
    fn detects_kannada_and_tamil() {
        assert_eq!(detect_language("ನನಗೆ ಸಹಾಯ ಬೇಕು"), "kn");
        assert_eq!(detect_language("எனக்கு உதவி தேவை"), "ta");
    }

    #[test]
    fn devanagari_wins_over_later_blocks_in_mixed_text() {
        // Mixed-script text classifies by the first recognized block in
        // check order, not by majority.
        assert_eq!(detect_language("ಸಹಾಯ और मदद"), "hi");
    }

    #[test]
    fn ascii_and_romanized_text_default_to_english() {
        assert_eq!(detect_language("I am fine"), "en");
        // Known heuristic gap: Romanized Hindi reads as English.
        assert_eq!(detect_language("mujhe madad chahiye"), "en");
    }

    #[test]
    fn clean_for_analysis_keeps_only_ascii_words() {
        assert_eq!(
            clean_for_analysis("I feel बहुत sad today!"),
            "I feel sad today!"
        );
        assert_eq!(clean_for_analysis("नमस्ते"), "");
    }

    #[tokio::test]
    async fn english_input_skips_translation() {
        let (lang, english) = normalize_language("hello there", &DisabledTranslator).await;
        assert_eq!(lang, "en");
        assert_eq!(english, "hello there");
    }

    #[tokio::test]
    async fn translation_failure_falls_back_to_original() {
        let (lang, english) = normalize_language("मैं ठीक हूँ", &DisabledTranslator).await;
        assert_eq!(lang, "hi");
        assert_eq!(english, "मैं ठीक हूँ");
    }

    #[tokio::test]
    async fn mock_translator_maps_text() {
        let t = MockTranslator::new().with_mapping("मैं ठीक हूँ", "i am fine");
        let (lang, english) = normalize_language("मैं ठीक हूँ", &t).await;
        assert_eq!(lang, "hi");
        assert_eq!(english, "i am fine");
    }
}
