
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{ChatModel, LlmError};
use crate::config::LlmConfig;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for an OpenAI-compatible `chat/completions` endpoint (Groq by default)
#[derive(Clone)]
pub struct GroqClient {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_base_ms: u64,
}

impl std::fmt::Debug for GroqClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl GroqClient {
    /// Build a client from the `[llm]` settings. Fails without an API key.
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolved_api_key()
            .ok_or(LlmError::MissingApiKey)?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent,
            retry_attempts: config.retry_attempts.max(1),
            backoff_base_ms: 1000,
        })
    }

    /// Override the first retry delay; later delays grow exponentially from it
    #[inline]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post_with_retry(&self, body: &str) -> Result<String, LlmError> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("LLM request attempt {}/{}", attempt, self.retry_attempts);

            let result = self
                .agent
                .post(self.endpoint.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            let error = match result {
                Ok(text) => return Ok(text),
                Err(error) => error,
            };

            let retryable = match &error {
                ureq::Error::StatusCode(status @ (401 | 403)) => {
                    error!("LLM service rejected credentials (status {})", status);
                    return Err(LlmError::Unauthorized(*status));
                }
                ureq::Error::StatusCode(status) if *status == 429 || *status >= 500 => {
                    warn!(
                        "LLM service returned {}, attempt {}/{}",
                        status, attempt, self.retry_attempts
                    );
                    LlmError::Status(*status)
                }
                ureq::Error::StatusCode(status) => {
                    warn!("LLM service returned {}, not retrying", status);
                    return Err(LlmError::Status(*status));
                }
                ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    LlmError::Transport(error.to_string())
                }
                _ => return Err(LlmError::Transport(error.to_string())),
            };
            last_error = Some(retryable);

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(
                    EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * self.backoff_base_ms,
                );
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for {}", self.endpoint);
        Err(last_error
            .unwrap_or_else(|| LlmError::Transport("request failed after retries".to_string())))
    }
}

impl ChatModel for GroqClient {
    #[inline]
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to encode request: {}", e)))?;

        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );
        let started = Instant::now();

        let response_text = self.post_with_retry(&body)?;

        let response: CompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)?;

        info!(
            "Completion from {} took {:?} ({} chars)",
            self.model,
            started.elapsed(),
            answer.len()
        );
        Ok(answer)
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}
