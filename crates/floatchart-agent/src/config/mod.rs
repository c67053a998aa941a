//! Configuration loading for FloatChart.
//! Reads floatchart.toml from the current directory or the path in FLOATCHART_CONFIG.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use floatchart_llm::{BackendConfig, BackendKind, GatewaySettings};
use floatchart_query::QuerySettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub gazetteer: GazetteerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider names in the order they are tried.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    pub groq: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
    pub openai_compatible: Option<ProviderConfig>,
}

fn default_priority() -> Vec<String> {
    ["groq", "openai", "anthropic", "gemini", "ollama"].iter().map(|s| s.to_string()).collect()
}
fn default_timeout_secs()         -> u64   { 8 }
fn default_max_concurrent_calls() -> usize { 4 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_calls: default_max_concurrent_calls(),
            groq: None,
            openai: None,
            anthropic: None,
            gemini: None,
            ollama: None,
            openai_compatible: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Empty means "read the provider's environment variable".
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GazetteerConfig {
    /// TOML gazetteer file; the built-in regions are used when unset.
    pub path: Option<PathBuf>,
}

/// Name, kind, default model and key variable for each known provider.
const PROVIDERS: &[(&str, BackendKind, &str, Option<&str>)] = &[
    ("groq",              BackendKind::Groq,             "llama-3.1-8b-instant",    Some("GROQ_API_KEY")),
    ("openai",            BackendKind::OpenAi,           "gpt-4o-mini",             Some("OPENAI_API_KEY")),
    ("anthropic",         BackendKind::Anthropic,        "claude-3-5-haiku-latest", Some("ANTHROPIC_API_KEY")),
    ("gemini",            BackendKind::Gemini,           "gemini-1.5-flash",        Some("GEMINI_API_KEY")),
    ("ollama",            BackendKind::Ollama,           "llama3:8b",               None),
    ("openai_compatible", BackendKind::OpenAiCompatible, "local-model",             None),
];

impl LlmConfig {
    fn section(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "groq" => self.groq.as_ref(),
            "openai" => self.openai.as_ref(),
            "anthropic" => self.anthropic.as_ref(),
            "gemini" => self.gemini.as_ref(),
            "ollama" => self.ollama.as_ref(),
            "openai_compatible" => self.openai_compatible.as_ref(),
            _ => None,
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            max_concurrent_calls: self.max_concurrent_calls.max(1),
        }
    }

    /// Providers in priority order. Hosted providers appear when a key is set in
    /// config or environment; local ones only when their section exists.
    pub fn backend_configs(&self, env: impl Fn(&str) -> Option<String>) -> Vec<BackendConfig> {
        let mut out = Vec::new();
        for name in &self.priority {
            let Some(&(_, kind, default_model, key_var)) = PROVIDERS.iter().find(|(n, ..)| n == name) else {
                tracing::warn!(provider = %name, "unknown provider in llm.priority, ignoring");
                continue;
            };
            let section = self.section(name);

            let api_key = match section.map(|s| s.api_key.as_str()) {
                Some(key) if !key.is_empty() => Some(key.to_string()),
                _ => key_var.and_then(&env).filter(|k| !k.is_empty()),
            };
            if key_var.is_some() && api_key.is_none() {
                if section.is_some() {
                    tracing::warn!(provider = %name, "provider configured but no API key found (set api_key or {})", key_var.unwrap_or_default());
                }
                continue;
            }
            if key_var.is_none() && section.is_none() {
                continue;
            }

            out.push(BackendConfig {
                name: name.clone(),
                kind,
                model: section.and_then(|s| s.model.clone()).unwrap_or_else(|| default_model.to_string()),
                api_key,
                base_url: section.and_then(|s| s.base_url.clone()),
            });
        }
        out
    }
}


impl Config {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.query.validate()?;
        Ok(config)
    }

    /// Load configuration from floatchart.toml.
    /// Checks FLOATCHART_CONFIG first, then the current directory. A missing file means defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("FLOATCHART_CONFIG")
            .unwrap_or_else(|_| "floatchart.toml".to_string());

        if !Path::new(&path).exists() {
            tracing::warn!("Config file not found: {path}, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }
}
