// src/brain/network.rs
// OpenAI-compatible chat completions over HTTP, with pacing, retries and a circuit breaker.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::guard::{CircuitBreaker, RateLimiter};
use super::{extract_json, TextGenerator};
use crate::config::AppConfig;
use crate::error::LlmError;

/// A known OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Provider {
    pub name: &'static str,
    pub base_url: &'static str,
    pub env_key: &'static str,
    pub default_model: &'static str,
}

pub const PROVIDERS: &[Provider] = &[
    Provider {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        env_key: "GROQ_API_KEY",
        default_model: "llama-3.3-70b-versatile",
    },
    Provider {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        env_key: "DEEPSEEK_API_KEY",
        default_model: "deepseek-chat",
    },
    Provider {
        name: "nvidia",
        base_url: "https://integrate.api.nvidia.com/v1",
        env_key: "NVIDIA_API_KEY",
        default_model: "moonshotai/kimi-k2.5",
    },
    Provider {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        env_key: "OPENROUTER_API_KEY",
        default_model: "mistralai/mistral-nemo",
    },
    Provider {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        env_key: "OPENAI_API_KEY",
        default_model: "gpt-4o-mini",
    },
    Provider {
        name: "google",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        env_key: "GOOGLE_API_KEY",
        default_model: "gemini-2.0-flash",
    },
    Provider {
        name: "moonshotai",
        base_url: "https://api.moonshot.cn/v1",
        env_key: "MOONSHOT_API_KEY",
        default_model: "moonshot-v1-32k",
    },
];

impl Provider {
    pub fn lookup(name: &str) -> Result<&'static Provider, LlmError> {
        PROVIDERS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| LlmError::UnknownProvider(name.to_string()))
    }
}

const DEFAULT_MAX_ATTEMPTS: usize = 5;
const BACKOFF_CAP_SECS: f64 = 60.0;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);
const JSON_NUDGE: &str = "IMPORTANT: Return ONLY valid JSON, no explanatory text. \
Your previous response was not valid JSON.";

// --- WIRE FORMAT ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

// --- CLIENT ---

pub struct NetworkBrain {
    provider: String,
    base_url: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
    limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    max_attempts: usize,
    max_wait: Duration,
}

impl NetworkBrain {
    pub fn new(provider: &str, api_key: SecretString, model: Option<String>) -> Result<Self, LlmError> {
        let info = Provider::lookup(provider)?;
        let timeout = if info.name == "deepseek" { 60 } else { 30 };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;
        Ok(Self {
            provider: info.name.to_string(),
            base_url: info.base_url.to_string(),
            model: model.unwrap_or_else(|| info.default_model.to_string()),
            api_key,
            client,
            limiter: Some(RateLimiter::new(4, Duration::from_secs(1))),
            breaker: Some(CircuitBreaker::new(5, Duration::from_secs(30))),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_wait: MAX_RETRY_WAIT,
        })
    }

    /// Resolves provider, key (config first, then the provider's env var) and guards from config.
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let info = Provider::lookup(&config.provider)?;
        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => std::env::var(info.env_key)
                .map(SecretString::new)
                .map_err(|_| LlmError::MissingApiKey(info.env_key.to_string()))?,
        };

        let mut brain = Self::new(info.name, api_key, config.model.clone())?
            .with_rate_limit(config.requests_per_second)
            .with_circuit_breaker(
                config.circuit_failure_threshold,
                Duration::from_secs(config.circuit_recovery_secs),
            );
        if let Some(url) = &config.base_url {
            brain = brain.with_base_url(url);
        }
        if let Some(secs) = config.request_timeout_secs {
            brain = brain.with_timeout(Duration::from_secs(secs))?;
        }
        Ok(brain)
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// `0` disables pacing.
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.limiter = (requests_per_second > 0)
            .then(|| RateLimiter::new(requests_per_second as usize, Duration::from_secs(1)));
        self
    }

    /// A zero threshold disables the breaker.
    pub fn with_circuit_breaker(mut self, failure_threshold: u32, recovery: Duration) -> Self {
        self.breaker = (failure_threshold > 0 && !recovery.is_zero())
            .then(|| CircuitBreaker::new(failure_threshold, recovery));
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Upper bound on any pause between attempts, including server-requested `Retry-After`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn record_failure(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_failure();
        }
    }

    fn status_error(&self, status: StatusCode, body: String) -> LlmError {
        LlmError::Status {
            provider: self.provider.clone(),
            status: status.as_u16(),
            body,
        }
    }
}

/// Rough token estimate for providers that omit usage.
fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        0
    } else {
        (text.len() as u64 / 4).max(1)
    }
}

pub(crate) fn backoff(attempt: usize) -> Duration {
    let base = (2f64.powi(attempt as i32) * 1.5).min(BACKOFF_CAP_SECS);
    let jitter = 0.2 * (attempt as f64 + 1.0);
    Duration::from_secs_f64((base + jitter).min(BACKOFF_CAP_SECS))
}

static RETRY_AFTER_UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([+-]?\d+(?:\.\d+)?)\s*(ms|s|sec|secs|second|seconds|m|min|mins|minute|minutes|h|hr|hrs|hour|hours)?$",
    )
    .expect("retry-after regex")
});

/// Parses a `Retry-After` value: bare seconds, a unit-suffixed amount, or an HTTP date.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(caps) = RETRY_AFTER_UNITS.captures(value) {
        let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
        if amount < 0.0 {
            return Some(Duration::ZERO);
        }
        let unit = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_else(|| "s".to_string());
        let seconds = match unit.as_str() {
            "ms" => amount / 1000.0,
            "m" | "min" | "mins" | "minute" | "minutes" => amount * 60.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => amount * 3600.0,
            _ => amount,
        };
        return Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX));
    }

    let when: DateTime<Utc> = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let delta = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Some(delta)
}

#[async_trait]
impl TextGenerator for NetworkBrain {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let started = Instant::now();

        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                return Err(LlmError::CircuitOpen {
                    provider: self.provider.clone(),
                    retry_in_secs: breaker.seconds_until_retry(),
                });
            }
        }

        let payload = ChatRequest {
            model: &self.model,
            messages: [
                ChatTurn { role: "system", content: system_prompt },
                ChatTurn { role: "user", content: user_prompt },
            ],
            temperature,
            max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url);

        for attempt in 0..self.max_attempts {
            let last_attempt = attempt + 1 == self.max_attempts;
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    self.record_failure();
                    if last_attempt {
                        return Err(err.into());
                    }
                    warn!(provider = %self.provider, attempt, error = %err, "BRAIN: Transport failure, retrying");
                    sleep(backoff(attempt).min(self.max_wait)).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.record_failure();
                if last_attempt {
                    return Err(LlmError::RateLimited {
                        provider: self.provider.clone(),
                        attempts: self.max_attempts,
                    });
                }
                let wait = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or_else(|| backoff(attempt))
                    .min(self.max_wait);
                warn!(provider = %self.provider, attempt, wait_ms = wait.as_millis() as u64, "BRAIN: Rate limited");
                sleep(wait).await;
                continue;
            }

            if status.is_server_error() {
                self.record_failure();
                if last_attempt {
                    let body = response.text().await.unwrap_or_default();
                    return Err(self.status_error(status, body));
                }
                sleep(backoff(attempt).min(self.max_wait)).await;
                continue;
            }

            if status.is_client_error() {
                self.record_failure();
                let body = response.text().await.unwrap_or_default();
                return Err(self.status_error(status, body));
            }

            let parsed: ChatResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.record_failure();
                    return Err(LlmError::InvalidResponse(err.to_string()));
                }
            };
            let content = match parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
            {
                Some(content) => content,
                None => {
                    self.record_failure();
                    return Err(LlmError::InvalidResponse("no choices in completion".into()));
                }
            };

            if let Some(breaker) = &self.breaker {
                breaker.record_success();
            }

            let usage = parsed.usage;
            let input_tokens = usage
                .as_ref()
                .and_then(|u| u.prompt_tokens)
                .unwrap_or_else(|| estimate_tokens(system_prompt) + estimate_tokens(user_prompt));
            let output_tokens = usage
                .as_ref()
                .and_then(|u| u.completion_tokens)
                .filter(|t| *t > 0)
                .unwrap_or_else(|| estimate_tokens(&content));
            debug!(
                provider = %self.provider,
                model = %self.model,
                input_tokens,
                output_tokens,
                latency_ms = started.elapsed().as_millis() as u64,
                http_status = status.as_u16(),
                retries = attempt,
                "BRAIN: completion"
            );
            return Ok(content.trim().to_string());
        }

        Err(LlmError::Http(format!(
            "completion failed after {} attempts",
            self.max_attempts
        )))
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        const JSON_RETRIES: usize = 2;
        let mut prompt = user_prompt.to_string();
        let mut extracted = String::new();

        for attempt in 0..=JSON_RETRIES {
            let raw = self
                .complete(system_prompt, &prompt, temperature, max_tokens)
                .await?;
            extracted = extract_json(&raw);
            if serde_json::from_str::<serde_json::Value>(&extracted).is_ok() {
                return Ok(extracted);
            }
            if attempt < JSON_RETRIES {
                debug!(provider = %self.provider, attempt, "BRAIN: Non-JSON completion, nudging");
                prompt = format!("{user_prompt}\n\n{JSON_NUDGE}");
            }
        }
        Ok(extracted)
    }
}
