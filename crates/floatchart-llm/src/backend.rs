//! Text-completion backends.
//!
//! Backends:
//!   OpenAiCompatibleBackend: chat-completions endpoints (Groq, OpenAI, local Ollama,
//!                            or any other server speaking the same protocol)
//!   AnthropicBackend:        Anthropic Messages API (claude-*)
//!   GeminiBackend:           Google Gemini generateContent API
//!
//! Every backend exposes the same single-turn "instruction + text in, text out"
//! operation, so the gateway treats them as interchangeable.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("No credential configured for {0}")]
    MissingCredential(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    /// Fixed instruction as the system message, text as the user message.
    /// Replies are expected to be a single tag, so the token budget is small.
    pub fn single_turn(instruction: &str, prompt: &str) -> Self {
        Self {
            messages: vec![Message::system(instruction), Message::user(prompt)],
            max_tokens: 32,
            temperature: 0.0,
        }
    }

    fn system_text(&self) -> Option<&str> {
        self.messages.iter().find(|m| m.role == "system").map(|m| m.content.as_str())
    }

    fn turns(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != "system")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
    /// Remote providers without an API key are skipped by the gateway.
    fn has_credential(&self) -> bool { true }
}

/// Map HTTP status to `LlmError`, then decode the body.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, LlmError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(LlmError::ApiError { status: status.as_u16(), message: api_error_message(&text) });
    }
    Ok(serde_json::from_str(&text)?)
}

/// Providers nest the message differently; take whichever is present.
fn api_error_message(body: &str) -> String {
    let json: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    json["error"]["message"].as_str()
        .or_else(|| json["message"].as_str())
        .or_else(|| json["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// ── 1. OpenAI-compatible chat completions ─────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletionResponse {
    fn into_response(self, fallback_model: &str) -> LlmResponse {
        LlmResponse {
            content: self.choices.into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default(),
            model: self.model.unwrap_or_else(|| fallback_model.to_string()),
            prompt_tokens: self.usage.prompt_tokens,
            completion_tokens: self.usage.completion_tokens,
        }
    }
}

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    local: bool,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub const GROQ_BASE_URL: &'static str = "https://api.groq.com/openai";
    pub const OPENAI_BASE_URL: &'static str = "https://api.openai.com";
    pub const OLLAMA_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            local: false,
            client: reqwest::Client::new(),
        }
    }

    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(Self::GROQ_BASE_URL, model, Some(api_key.into()))
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(Self::OPENAI_BASE_URL, model, Some(api_key.into()))
    }

    /// Local Ollama through its OpenAI-compatible route. Needs no key.
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { local: true, ..Self::new(base_url, model, None) }
    }

    /// Point a preset at another host, keeping its key and locality.
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            self.base_url = url.to_string();
        }
        self
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let mut call = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let parsed: ChatCompletionResponse = read_json(call.send().await?).await?;
        Ok(parsed.into_response(&self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { self.local }
    fn has_credential(&self) -> bool { self.local || self.api_key.is_some() }
}

// ── 2. Anthropic Messages ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<&'a Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub struct AnthropicBackend {
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    const MESSAGES_URL: &'static str = "https://api.anthropic.com/v1/messages";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: model.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredential("anthropic".to_string()));
        }
        let body = AnthropicRequest {
            model: &self.model,
            system: req.system_text(),
            messages: req.turns().collect(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let resp = self.client
            .post(Self::MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await?;
        let parsed: AnthropicResponse = read_json(resp).await?;

        Ok(LlmResponse {
            content: parsed.content.into_iter().find_map(|b| b.text).unwrap_or_default(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            prompt_tokens: parsed.usage.input_tokens,
            completion_tokens: parsed.usage.output_tokens,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn has_credential(&self) -> bool { !self.api_key.is_empty() }
}

// ── 3. Google Gemini ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: GeminiUsage,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn gemini_text(text: &str) -> Vec<GeminiPart> {
    vec![GeminiPart { text: text.to_string() }]
}

pub struct GeminiBackend {
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: model.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredential("gemini".to_string()));
        }
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let body = GeminiRequest {
            contents: req.turns()
                .map(|m| GeminiContent { role: Some("user".to_string()), parts: gemini_text(&m.content) })
                .collect(),
            system_instruction: req.system_text()
                .map(|s| GeminiContent { role: None, parts: gemini_text(s) }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: req.max_tokens,
                temperature: req.temperature,
            },
        };
        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: GeminiResponse = read_json(resp).await?;

        let content = parsed.candidates.into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            prompt_tokens: parsed.usage_metadata.prompt_token_count,
            completion_tokens: parsed.usage_metadata.candidates_token_count,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn has_credential(&self) -> bool { !self.api_key.is_empty() }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_backends_need_keys() {
        assert!(OpenAiCompatibleBackend::openai("sk-test", "gpt-4o-mini").has_credential());
        assert!(!AnthropicBackend::new("", "claude-3-5-haiku-latest").has_credential());
        assert!(!GeminiBackend::new("", "gemini-1.5-flash").has_credential());
        assert!(!OpenAiCompatibleBackend::new("http://x", "m", Some(String::new())).has_credential());
    }

    #[test]
    fn test_groq_uses_compatible_endpoint() {
        let b = OpenAiCompatibleBackend::groq("gsk-test", "llama-3.1-8b-instant");
        assert_eq!(b.base_url, OpenAiCompatibleBackend::GROQ_BASE_URL);
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "llama-3.1-8b-instant");
    }

    #[test]
    fn test_base_url_override_keeps_preset_key() {
        let b = OpenAiCompatibleBackend::groq("gsk-test", "llama-3.1-8b-instant")
            .with_base_url(Some("https://proxy.internal/groq"));
        assert_eq!(b.base_url, "https://proxy.internal/groq");
        assert!(b.has_credential());

        let b = OpenAiCompatibleBackend::openai("sk-test", "gpt-4o-mini").with_base_url(None);
        assert_eq!(b.base_url, OpenAiCompatibleBackend::OPENAI_BASE_URL);
    }

    #[test]
    fn test_ollama_is_local_and_keyless() {
        let b = OpenAiCompatibleBackend::ollama(OpenAiCompatibleBackend::OLLAMA_BASE_URL, "llama3:8b");
        assert!(b.is_local());
        assert!(b.has_credential());
    }

    #[test]
    fn test_chat_completion_response_decoding() {
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{
            "model": "llama-3.1-8b-instant",
            "choices": [{ "message": { "role": "assistant", "content": "trajectory" } }],
            "usage": { "prompt_tokens": 40, "completion_tokens": 2 }
        }"#).unwrap();
        let resp = parsed.into_response("fallback");
        assert_eq!(resp.content, "trajectory");
        assert_eq!(resp.model, "llama-3.1-8b-instant");
        assert_eq!(resp.completion_tokens, 2);

        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let resp = parsed.into_response("fallback");
        assert!(resp.content.is_empty());
        assert_eq!(resp.model, "fallback");
    }

    #[test]
    fn test_anthropic_request_splits_system() {
        let req = LlmRequest::single_turn("Answer with one tag.", "salinity in bengal");
        let body = AnthropicRequest {
            model: "claude",
            system: req.system_text(),
            messages: req.turns().collect(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "Answer with one tag.");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_api_error_message_shapes() {
        assert_eq!(api_error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(api_error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(api_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_single_turn_request_shape() {
        let req = LlmRequest::single_turn("Answer with one tag.", "salinity in bengal");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.system_text(), Some("Answer with one tag."));
        assert_eq!(req.max_tokens, 32);
    }
}
