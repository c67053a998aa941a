//! Audit records for provider calls made by the gateway.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Skipped,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub id: Uuid,
    pub provider: String,
    pub model: String,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// SHA-256 of the returned text; empty unless the call succeeded.
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl ProviderAttempt {
    pub fn success(
        provider: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        output: &str,
        latency_ms: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            model: model.to_string(),
            outcome: AttemptOutcome::Success,
            error: None,
            prompt_tokens,
            completion_tokens,
            output_hash,
            latency_ms,
            called_at: Utc::now(),
        }
    }

    pub fn failure(
        provider: &str,
        model: &str,
        outcome: AttemptOutcome,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            model: model.to_string(),
            outcome,
            error: Some(error.into()),
            prompt_tokens: 0,
            completion_tokens: 0,
            output_hash: String::new(),
            latency_ms,
            called_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_hashes_output() {
        let a = ProviderAttempt::success("groq", "llama", 10, 1, "proximity", 120);
        assert_eq!(a.outcome, AttemptOutcome::Success);
        assert_eq!(a.output_hash.len(), 64);
        assert!(a.error.is_none());
    }

    #[test]
    fn test_failure_keeps_error_text() {
        let a = ProviderAttempt::failure("openai", "gpt-4o-mini", AttemptOutcome::TimedOut, "timed out", 8000);
        assert_eq!(a.outcome, AttemptOutcome::TimedOut);
        assert_eq!(a.error.as_deref(), Some("timed out"));
        assert!(a.output_hash.is_empty());
    }
}
