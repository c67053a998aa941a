//! Provider gateway: tries interchangeable completion backends in priority order.
//!
//! A provider without a credential is skipped, a provider that errors or exceeds
//! the per-call timeout is recorded as failed and the next one is tried. When every
//! provider fails the caller gets `ProviderUnavailable`, never a panic or a raw
//! transport error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::audit::{AttemptOutcome, ProviderAttempt};
use crate::backend::{AnthropicBackend, GeminiBackend, LlmBackend, LlmRequest, OpenAiCompatibleBackend};

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Upper bound for a single provider call.
    pub timeout: Duration,
    /// Soft cap on outstanding provider calls across all requests.
    pub max_concurrent_calls: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            max_concurrent_calls: 4,
        }
    }
}

/// Successful completion plus the attempts that led to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayReply {
    pub provider: String,
    pub model: String,
    pub content: String,
    pub attempts: Vec<ProviderAttempt>,
}

#[derive(Debug, Error)]
#[error("no text-completion provider produced a reply ({} attempted)", .attempts.len())]
pub struct ProviderUnavailable {
    pub attempts: Vec<ProviderAttempt>,
}

pub struct ProviderGateway {
    providers: Vec<(String, Arc<dyn LlmBackend>)>,
    settings: GatewaySettings,
    permits: Arc<Semaphore>,
}

impl ProviderGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_calls.max(1)));
        Self { providers: Vec::new(), settings, permits }
    }

    /// Append a provider. Registration order is priority order.
    pub fn register_backend(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        self.providers.push((name.into(), backend));
    }

    pub fn registered_backends(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn complete(
        &self,
        prompt: &str,
        instruction: &str,
    ) -> Result<GatewayReply, ProviderUnavailable> {
        let req = LlmRequest::single_turn(instruction, prompt);
        let mut attempts = Vec::with_capacity(self.providers.len());

        for (name, backend) in &self.providers {
            if !backend.has_credential() {
                tracing::debug!(provider = %name, "skipping provider without credential");
                attempts.push(ProviderAttempt::failure(
                    name, backend.model_id(), AttemptOutcome::Skipped, "no credential configured", 0,
                ));
                continue;
            }

            let _permit = match self.permits.acquire().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let started = Instant::now();
            let result = tokio::time::timeout(self.settings.timeout, backend.complete(req.clone())).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let attempt = match result {
                Ok(Ok(resp)) if !resp.content.trim().is_empty() => {
                    let attempt = ProviderAttempt::success(
                        name, &resp.model, resp.prompt_tokens, resp.completion_tokens,
                        &resp.content, latency_ms,
                    );
                    tracing::info!(provider = %name, model = %resp.model, latency_ms, "provider replied");
                    attempts.push(attempt);
                    return Ok(GatewayReply {
                        provider: name.clone(),
                        model: resp.model,
                        content: resp.content,
                        attempts,
                    });
                }
                Ok(Ok(_)) => ProviderAttempt::failure(
                    name, backend.model_id(), AttemptOutcome::Failed, "empty completion", latency_ms,
                ),
                Ok(Err(e)) => ProviderAttempt::failure(
                    name, backend.model_id(), AttemptOutcome::Failed, e.to_string(), latency_ms,
                ),
                Err(_) => ProviderAttempt::failure(
                    name, backend.model_id(), AttemptOutcome::TimedOut,
                    format!("timed out after {} ms", self.settings.timeout.as_millis()), latency_ms,
                ),
            };
            tracing::warn!(
                provider = %name,
                outcome = ?attempt.outcome,
                error = attempt.error.as_deref().unwrap_or(""),
                "provider call failed, trying next"
            );
            attempts.push(attempt);
        }

        Err(ProviderUnavailable { attempts })
    }
}

// ── Construction from configuration ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Groq,
    OpenAiCompatible,
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl BackendKind {
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, BackendKind::Ollama | BackendKind::OpenAiCompatible)
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Build a gateway from configured backends, keeping their order.
/// Backends that need a key and have none are left out.
pub fn build_gateway(backends: Vec<BackendConfig>, settings: GatewaySettings) -> ProviderGateway {
    let mut gateway = ProviderGateway::new(settings);

    for cfg in backends {
        let key = cfg.api_key.clone().filter(|k| !k.is_empty());
        if cfg.kind.requires_api_key() && key.is_none() {
            tracing::warn!(provider = %cfg.name, "provider configured without API key, skipping");
            continue;
        }

        let backend: Arc<dyn LlmBackend> = match cfg.kind {
            BackendKind::Groq => Arc::new(
                OpenAiCompatibleBackend::groq(key.unwrap_or_default(), &cfg.model)
                    .with_base_url(cfg.base_url.as_deref()),
            ),
            BackendKind::OpenAiCompatible => Arc::new(OpenAiCompatibleBackend::new(
                cfg.base_url.as_deref().unwrap_or("http://localhost:1234"),
                &cfg.model,
                key,
            )),
            BackendKind::OpenAi => Arc::new(
                OpenAiCompatibleBackend::openai(key.unwrap_or_default(), &cfg.model)
                    .with_base_url(cfg.base_url.as_deref()),
            ),
            BackendKind::Anthropic => Arc::new(AnthropicBackend::new(key.unwrap_or_default(), &cfg.model)),
            BackendKind::Gemini => Arc::new(GeminiBackend::new(key.unwrap_or_default(), &cfg.model)),
            BackendKind::Ollama => Arc::new(
                OpenAiCompatibleBackend::ollama(OpenAiCompatibleBackend::OLLAMA_BASE_URL, &cfg.model)
                    .with_base_url(cfg.base_url.as_deref()),
            ),
        };

        tracing::debug!(provider = %cfg.name, model = %cfg.model, "registered provider");
        gateway.register_backend(cfg.name, backend);
    }

    gateway
}
