//! Supportive reply generation. The companion reply is an external LLM
//! call; the pipeline only needs a text back and must keep answering when
//! the provider is down, so every failure falls back to a fixed line.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::risk::RiskLevel;

/// Sent when the crisis fast path fires, before any model runs.
pub const CRISIS_FAST_PATH_REPLY: &str = "I hear you, and I'm really glad you shared this with \
     me. Take a slow, deep breath with me - you're safe right now.";

/// Sent when the fused assessment resolves to high risk.
pub const CRISIS_PIPELINE_REPLY: &str = "I can sense you're going through something really \
     tough... Let's take a moment together. Breathe in slowly... and out.";

/// Fallback when the reply provider is unavailable or errors.
pub const FALLBACK_REPLY: &str =
    "I'm here with you. Please tell me a bit more about what you're feeling.";

/// What the provider gets to condition on.
#[derive(Debug, Clone)]
pub struct ReplyRequest<'a> {
    pub user_text: &'a str,
    pub risk_level: RiskLevel,
    /// Detected language code of the original message.
    pub language: &'a str,
}

/// External LLM collaborator producing the companion reply. `None` means
/// "use the fallback line".
pub trait ReplyProvider: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a ReplyRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynReplyProvider = Arc<dyn ReplyProvider>;

/// Always falls back; used when no provider is configured.
pub struct DisabledReplyProvider;

impl ReplyProvider for DisabledReplyProvider {
    fn generate<'a>(
        &'a self,
        _request: &'a ReplyRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Canned reply for tests and local runs.
pub struct MockReplyProvider {
    reply: String,
}

impl MockReplyProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl ReplyProvider for MockReplyProvider {
    fn generate<'a>(
        &'a self,
        _request: &'a ReplyRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let reply = self.reply.clone();
        Box::pin(async move { Some(reply) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

fn language_name(code: &str) -> &'static str {
    match code {
        "hi" => "Hindi",
        "kn" => "Kannada",
        "ta" => "Tamil",
        _ => "English",
    }
}

/// HTTP provider against an OpenAI-style chat completion gateway.
pub struct HttpReplyProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpReplyProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("psynova-risk-engine/0.1")
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_prompt(request: &ReplyRequest<'_>) -> String {
        let lang = language_name(request.language);
        format!(
            "You are a warm, emotionally aware student mental-health companion. \
             Reply in the same language and script as the user ({lang}). \
             Keep replies short and calm; validate feelings, never lecture. \
             In distress, focus entirely on grounding the user; professional \
             alerting happens elsewhere, so never mention helplines or tell \
             them to seek help.\n\n\
             User message: {text}\n\
             User risk level: {risk}",
            lang = lang,
            text = request.user_text,
            risk = request.risk_level.as_index(),
        )
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ReplyProvider for HttpReplyProvider {
    fn generate<'a>(
        &'a self,
        request: &'a ReplyRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let body = ChatCompletionRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: Self::build_prompt(request),
                }],
            };
            let result = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "reply provider request failed");
                    return None;
                }
            };
            if !response.status().is_success() {
                warn!(status = %response.status(), "reply provider returned non-success");
                return None;
            }
            match response.json::<ChatCompletionResponse>().await {
                Ok(parsed) => parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content.trim().to_string())
                    .filter(|s| !s.is_empty()),
                Err(e) => {
                    warn!(error = %e, "reply provider returned unparseable body");
                    None
                }
            }
        })
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

/// Provider call with the fixed fallback applied.
pub async fn generate_supportive_reply(
    provider: &dyn ReplyProvider,
    request: &ReplyRequest<'_>,
) -> String {
    match provider.generate(request).await {
        Some(text) => text,
        None => {
            warn!(
                provider = provider.provider_name(),
                "reply provider produced nothing, using fallback"
            );
            FALLBACK_REPLY.to_string()
        }
    }
}
