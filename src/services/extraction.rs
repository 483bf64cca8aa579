use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("document is not valid UTF-8 text")]
    InvalidText,
    #[error("no extraction service configured for {0} documents")]
    NotConfigured(&'static str),
    #[error("extraction service failed: {0}")]
    Service(String),
}

#[async_trait]
pub(crate) trait TextExtractor: Send + Sync {
    async fn extract_text(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentKind {
    PlainText,
    Pdf,
}

pub(crate) fn document_kind(file_name: &str, content_type: &str) -> Option<DocumentKind> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => Some(DocumentKind::Pdf),
        Some("txt" | "md") => Some(DocumentKind::PlainText),
        _ => match content_type.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "text/plain" | "text/markdown" => Some(DocumentKind::PlainText),
            _ => None,
        },
    }
}

/// Reads text documents directly and sends PDFs to the Datalab marker service.
#[derive(Debug, Clone)]
pub(crate) struct DocumentTextExtractor {
    marker: Option<MarkerClient>,
}

impl DocumentTextExtractor {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let marker = if settings.extraction().datalab_api_key.is_empty() {
            tracing::info!("DATALAB_API_KEY not set; PDF text extraction disabled");
            None
        } else {
            Some(MarkerClient::from_settings(settings)?)
        };
        Ok(Self { marker })
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<String, ExtractionError> {
        match document_kind(file_name, content_type) {
            Some(DocumentKind::PlainText) => std::str::from_utf8(bytes)
                .map(|text| text.trim_start_matches('\u{feff}').to_string())
                .map_err(|_| ExtractionError::InvalidText),
            Some(DocumentKind::Pdf) => {
                let marker = self.marker.as_ref().ok_or(ExtractionError::NotConfigured("pdf"))?;
                marker.convert(bytes, file_name).await.map_err(|err| {
                    ExtractionError::Service(format!("{err:#}"))
                })
            }
            None => Err(ExtractionError::Unsupported(file_name.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct MarkerClient {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl MarkerClient {
    fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let extraction = settings.extraction();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(extraction.timeout_seconds))
            .build()
            .context("Failed to build Datalab HTTP client")?;

        Ok(Self {
            client,
            api_key: extraction.datalab_api_key.clone(),
            base_url: extraction.datalab_base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(extraction.poll_interval_seconds),
            max_poll_attempts: extraction.max_poll_attempts,
        })
    }

    async fn convert(&self, bytes: &[u8], file_name: &str) -> anyhow::Result<String> {
        let check_url = self.submit(bytes, file_name).await?;

        for attempt in 1..=self.max_poll_attempts {
            let body = self.fetch_json(self.client.get(&check_url)).await?;

            match job_state(&body) {
                JobState::Complete => {
                    return result_markdown(&body)
                        .context("Datalab job completed without markdown output");
                }
                JobState::Failed => {
                    anyhow::bail!("Datalab job failed: {}", error_detail(&body));
                }
                JobState::Running if attempt < self.max_poll_attempts => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                JobState::Running => {}
            }
        }

        anyhow::bail!("Datalab job did not finish after {} polls", self.max_poll_attempts)
    }

    async fn submit(&self, bytes: &[u8], file_name: &str) -> anyhow::Result<String> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .context("Invalid document mime type")?;
        let form = Form::new().part("file", part).text("output_format", "markdown");

        let body = self
            .fetch_json(self.client.post(format!("{}/marker", self.base_url)).multipart(form))
            .await?;

        if body.get("success").and_then(Value::as_bool) == Some(false) {
            anyhow::bail!("Datalab rejected the document: {}", error_detail(&body));
        }

        check_url(&self.base_url, &body).context("Datalab response has no request reference")
    }

    async fn fetch_json(&self, request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let response = request
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("Datalab request failed")?;
        let status = response.status();
        let raw = response.text().await.context("Failed to read Datalab response")?;
        let body: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Datalab returned non-JSON body (status {status})"))?;

        if !status.is_success() {
            anyhow::bail!("Datalab returned {status}: {}", error_detail(&body));
        }
        Ok(body)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum JobState {
    Running,
    Complete,
    Failed,
}

fn job_state(body: &Value) -> JobState {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    match status.to_ascii_lowercase().as_str() {
        "complete" | "completed" => JobState::Complete,
        "failed" | "error" => JobState::Failed,
        _ if body.get("success").and_then(Value::as_bool) == Some(false) => JobState::Failed,
        _ => JobState::Running,
    }
}

fn check_url(base_url: &str, body: &Value) -> Option<String> {
    if let Some(raw) = body.get("request_check_url").and_then(Value::as_str) {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Some(raw.to_string());
        }
        let base = reqwest::Url::parse(&format!("{base_url}/")).ok()?;
        return base.join(raw.trim_start_matches('/')).ok().map(|url| url.to_string());
    }

    body.get("request_id")
        .and_then(Value::as_str)
        .map(|request_id| format!("{base_url}/marker/{request_id}"))
}

fn result_markdown(body: &Value) -> Option<String> {
    body.pointer("/result/markdown")
        .or_else(|| body.get("markdown"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn error_detail(body: &Value) -> String {
    if let Some(items) = body.get("detail").and_then(Value::as_array) {
        let joined = items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            return joined;
        }
    }

    ["detail", "error", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}
