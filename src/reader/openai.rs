//! OpenAI Responses API reader: uploads the PDF itself.
//!
//! The request carries the document as a base64 `input_file` followed by the
//! instruction as `input_text`. The answer is the concatenation of every
//! `output_text` part in the response.

use super::DocumentReader;
use crate::error::ReaderError;
use crate::model::Attachment;
use crate::pipeline::encode::pdf_data_url;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default API root; `OPENAI_BASE_URL` overrides it.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const BACKEND: &str = "openai-file";

/// Longest slice of a non-JSON error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Reader backed by `POST {base_url}/responses`.
pub struct OpenAiFileReader {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiFileReader {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReaderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReaderError::Service {
                backend: BACKEND.into(),
                message: e.to_string(),
            })?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Point the reader at another API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: Value) -> Result<String, ReaderError> {
        let url = format!("{}/responses", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReaderError::Timeout {
                        backend: BACKEND.into(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ReaderError::Service {
                        backend: BACKEND.into(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let payload: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ReaderError::Auth {
                backend: BACKEND.into(),
                detail: api_error_message(&payload, &raw).unwrap_or_else(|| status.to_string()),
            });
        }
        if !status.is_success() {
            return Err(ReaderError::Service {
                backend: BACKEND.into(),
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    api_error_message(&payload, &raw).unwrap_or_else(|| "no error body".into())
                ),
            });
        }

        let usage = payload.get("usage").map(Value::to_string).unwrap_or_default();
        debug!("openai usage: {}", usage);
        collect_output_text(&payload).ok_or_else(|| ReaderError::Service {
            backend: BACKEND.into(),
            message: "response contained no output_text".into(),
        })
    }
}

/// Request body for a document + instruction call.
pub(crate) fn document_request(model: &str, attachment: &Attachment, instruction: &str) -> Value {
    json!({
        "model": model,
        "input": [{
            "role": "user",
            "content": [
                {
                    "type": "input_file",
                    "filename": attachment.filename,
                    "file_data": pdf_data_url(attachment),
                },
                { "type": "input_text", "text": instruction },
            ],
        }],
    })
}

/// Join every `output[].content[]` part of type `output_text`.
///
/// Some gateways add a top-level `output_text` convenience field; it is used
/// when present.
pub(crate) fn collect_output_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return Some(text.trim().to_string());
    }
    let parts: Vec<&str> = payload
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.concat().trim().to_string())
    }
}

/// `error.message` of a JSON error body, else the start of the raw body
/// (proxies answer with HTML or plain text).
fn api_error_message(payload: &Value, raw: &str) -> Option<String> {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            let text = raw.trim();
            (!text.is_empty()).then(|| text.chars().take(MAX_ERROR_BODY_CHARS).collect())
        })
}

#[async_trait]
impl DocumentReader for OpenAiFileReader {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn read(&self, attachment: &Attachment, instruction: &str) -> Result<String, ReaderError> {
        self.post(document_request(&self.model, attachment, instruction))
            .await
    }

    async fn ask(&self, prompt: &str) -> Result<String, ReaderError> {
        self.post(json!({ "model": self.model, "input": prompt })).await
    }
}
