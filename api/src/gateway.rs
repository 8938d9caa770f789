//! Completion gateway: the boundary to the external text-generation capability.
//!
//! The gateway owns mode-specific generation parameters, the bounded wait, the
//! empty-response check and the respond-mode fallback. It never retries; retry
//! policy belongs to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rehearse_core::error::UpstreamError;
use serde::{Deserialize, Serialize};

/// Said by the simulated customer when text generation fails mid-conversation.
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I'm having some technical difficulties on my end. Could you repeat that?";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Next customer turn
    Respond,
    /// JSON scoring of the user's performance
    Analyze,
}

impl CompletionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionMode::Respond => "respond",
            CompletionMode::Analyze => "analyze",
        }
    }

    pub fn params(self) -> GenerationParams {
        match self {
            CompletionMode::Respond => GenerationParams {
                temperature: Some(0.9),
                max_tokens: Some(150),
                json_output: false,
            },
            CompletionMode::Analyze => GenerationParams {
                temperature: Some(0.2),
                max_tokens: Some(800),
                json_output: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Ask the backend for a JSON object response
    pub json_output: bool,
}

/// The external text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams)
    -> Result<String, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Read `REHEARSE_LLM_*` variables, falling back to `OPENAI_API_KEY` for the key.
    pub fn from_env() -> Self {
        let non_empty = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_secs = non_empty("REHEARSE_LLM_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            base_url: non_empty("REHEARSE_LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: non_empty("REHEARSE_LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
            model: non_empty("REHEARSE_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Clone)]
pub struct CompletionGateway {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl CompletionGateway {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn complete(
        &self,
        prompt: &str,
        mode: CompletionMode,
    ) -> Result<String, UpstreamError> {
        let params = mode.params();
        let started = Instant::now();

        let generation = self.generator.generate(prompt, &params);
        let result = match tokio::time::timeout(self.timeout, generation).await {
            Err(_) => Err(UpstreamError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
            Ok(Err(err)) => Err(err),
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    Err(UpstreamError::EmptyResponse)
                } else {
                    Ok(text.to_string())
                }
            }
        };

        match &result {
            Ok(text) => tracing::debug!(
                mode = mode.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = text.len(),
                "completion succeeded"
            ),
            Err(err) => tracing::warn!(
                mode = mode.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "completion failed"
            ),
        }
        result
    }

    /// Respond-mode completion that never fails: upstream errors become [`FALLBACK_RESPONSE`].
    pub async fn respond(&self, prompt: &str) -> String {
        match self.complete(prompt, CompletionMode::Respond).await {
            Ok(text) => strip_speaker_cue(&text).to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "substituting fallback customer line");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// Models occasionally echo the `AI:` cue the respond prompt ends with.
fn strip_speaker_cue(text: &str) -> &str {
    match text.strip_prefix("AI:") {
        Some(rest) if !rest.trim().is_empty() => rest.trim_start(),
        _ => text,
    }
}

// --- OpenAI-compatible chat completions client ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Text generation over any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiChatGenerator {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            UpstreamError::Unavailable("no API key configured for text generation".to_string())
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: params.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Unavailable(format!(
                "text generation returned HTTP {status}"
            )));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        extract_content(parsed)
    }
}

impl OpenAiChatGenerator {
    fn map_transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            UpstreamError::Unavailable(err.to_string())
        }
    }
}

fn extract_content(response: ChatResponse) -> Result<String, UpstreamError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(UpstreamError::EmptyResponse)
}
