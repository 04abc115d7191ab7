// src/brain/mod.rs
// FOCUS PANEL - TEXT GENERATION CAPABILITY
// One trait, two engines: the networked OpenAI-compatible client and the offline mock.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::config::AppConfig;
use crate::error::LlmError;

mod guard;
mod mock;
mod network;

pub use guard::{CircuitBreaker, CircuitState, RateLimiter};
pub use mock::MockBrain;
pub use network::{parse_retry_after, Provider, NetworkBrain, PROVIDERS};

/// Anything that can turn a (system, user) prompt pair into text.
///
/// Callers must treat every completion as untrusted: `complete_json` only
/// promises text that is *believed* to be JSON.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError>;

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let raw = self
            .complete(system_prompt, user_prompt, temperature, max_tokens)
            .await?;
        Ok(extract_json(&raw))
    }
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)```").expect("fenced block regex")
});

/// Pulls a JSON payload out of a chatty completion.
///
/// Order: fenced code block, outermost `[...]` or `{...}` span, trimmed text.
pub fn extract_json(text: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }
    // Outermost span wins: whichever bracket opens first.
    let span = [('[', ']'), ('{', '}')]
        .into_iter()
        .filter_map(|(open, close)| match (text.find(open), text.rfind(close)) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        })
        .min_by_key(|(start, _)| *start);
    match span {
        Some((start, end)) => text[start..=end].to_string(),
        None => text.trim().to_string(),
    }
}

/// Builds the engine named in the config (`mock` needs no network or key).
pub fn build_brain(config: &AppConfig) -> Result<Arc<dyn TextGenerator>, LlmError> {
    if config.provider.eq_ignore_ascii_case("mock") {
        tracing::info!("BRAIN: Using deterministic mock engine");
        return Ok(Arc::new(MockBrain::new()));
    }
    let brain = NetworkBrain::from_config(config)?;
    tracing::info!(
        provider = brain.provider(),
        model = brain.model(),
        "BRAIN: Network engine online"
    );
    Ok(Arc::new(brain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Sure!\n```json\n{\"changed_mind\": true}\n```\nHope that helps";
        assert_eq!(extract_json(raw), "{\"changed_mind\": true}");
    }

    #[test]
    fn prefers_array_span_over_object() {
        let raw = "Here you go: [{\"a\": 1}, {\"b\": 2}] done";
        assert_eq!(extract_json(raw), "[{\"a\": 1}, {\"b\": 2}]");
    }

    #[test]
    fn falls_back_to_object_span_then_text() {
        assert_eq!(extract_json("answer: {\"x\": 2} ok"), "{\"x\": 2}");
        assert_eq!(extract_json("{\"tags\": [1, 2]}"), "{\"tags\": [1, 2]}");
        assert_eq!(extract_json("  no json here  "), "no json here");
    }
}
