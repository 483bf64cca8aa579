use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Clone)]
pub(crate) struct GenerationRequest {
    pub(crate) prompt: String,
    pub(crate) temperature: f64,
    pub(crate) max_output_tokens: u32,
    pub(crate) timeout: Duration,
    /// Overrides the server key for this call.
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
    #[error("no generation api key available")]
    MissingApiKey,
}

#[async_trait]
pub(crate) trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format.
/// Makes exactly one attempt per call.
#[derive(Debug, Clone)]
pub(crate) struct ChatCompletionsGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatCompletionsGenerator {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build generation HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
        })
    }

    fn resolve_key<'a>(&'a self, request: &'a GenerationRequest) -> Option<&'a str> {
        request
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or_else(|| Some(self.api_key.as_str()).filter(|key| !key.is_empty()))
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let api_key = self.resolve_key(&request).ok_or(GenerationError::MissingApiKey)?;

        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_completion_tokens": request.max_output_tokens,
            "temperature": request.temperature,
        });

        let timer = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| classify_transport(err, request.timeout))?;

        let status = response.status();
        let raw_body =
            response.text().await.map_err(|err| classify_transport(err, request.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&raw_body)
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| truncate_for_log(&raw_body));
            tracing::warn!(status = status.as_u16(), %message, "Generation request rejected");
            return Err(GenerationError::Status { status: status.as_u16(), message });
        }

        let body: Value = serde_json::from_str(&raw_body)
            .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
        let content = completion_content(&body).ok_or_else(|| {
            GenerationError::MalformedResponse("missing choices[0].message.content".to_string())
        })?;

        let tokens_used = body.pointer("/usage/total_tokens").and_then(Value::as_u64);
        tracing::debug!(
            model = %self.model,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            "Generation completed"
        );

        Ok(content.to_string())
    }
}

fn classify_transport(err: reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::Transport(err.to_string())
    }
}

fn completion_content(body: &Value) -> Option<&str> {
    body.pointer("/choices/0/message/content").and_then(Value::as_str)
}

fn error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("error"))
        .or_else(|| body.get("detail"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn truncate_for_log(raw: &str) -> String {
    const LIMIT: usize = 300;
    if raw.chars().count() <= LIMIT {
        return raw.to_string();
    }
    let mut clipped: String = raw.chars().take(LIMIT).collect();
    clipped.push_str("...");
    clipped
}
