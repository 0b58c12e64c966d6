//! Gmail REST source.
//!
//! Authentication uses an existing OAuth refresh token: `credentials.json`
//! (the `installed` or `web` client downloaded from the Google console) plus
//! `token.json` holding at least a `refresh_token`. The interactive consent
//! flow that produces the first token is out of scope.
//!
//! Any 401/403 from Google, and any failed token exchange, is reported as
//! [`PipelineError::SourceAuth`]: the run cannot continue without the
//! mailbox.

use super::{AttachmentSource, SearchQuery};
use crate::error::PipelineError;
use crate::model::{Attachment, MessageHandle};
use async_trait::async_trait;
use base64::alphabet::URL_SAFE;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SERVICE: &str = "gmail";
const API_ROOT: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Gmail sends attachment bodies as base64url, with or without padding.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── Credentials ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoredToken {
    #[serde(default, alias = "token")]
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    expiry_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(60) > now
    }
}

/// Mailbox access through the Gmail REST API.
pub struct GmailSource {
    client: reqwest::Client,
    secrets: ClientSecrets,
    refresh_token: String,
    token: Mutex<Option<AccessToken>>,
}

impl GmailSource {
    /// Load `credentials.json` and `token.json`.
    pub async fn from_files(credentials: &Path, token: &Path) -> Result<Self, PipelineError> {
        let secrets: CredentialsFile = read_json(credentials).await?;
        let secrets = secrets
            .installed
            .or(secrets.web)
            .ok_or_else(|| PipelineError::CredentialsUnreadable {
                path: credentials.to_path_buf(),
                detail: "expected an 'installed' or 'web' client".into(),
            })?;

        let stored: StoredToken = read_json(token).await?;
        let refresh_token = stored
            .refresh_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::SourceAuth {
                service: SERVICE.into(),
                detail: format!(
                    "'{}' has no refresh_token; complete the OAuth consent flow first",
                    token.display()
                ),
            })?;

        let cached = match (stored.access_token, stored.expiry_date) {
            (Some(value), Some(ms)) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(|expires_at| AccessToken { value, expires_at }),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| transport(e.to_string()))?;

        Ok(Self {
            client,
            secrets,
            refresh_token,
            token: Mutex::new(cached),
        })
    }

    /// A valid access token, refreshing it when needed.
    async fn access_token(&self) -> Result<String, PipelineError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        debug!("Refreshing Gmail access token");
        let uri = self
            .secrets
            .token_uri
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_URI);
        let response = self
            .client
            .post(uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::SourceAuth {
                service: SERVICE.into(),
                detail: format!("token refresh failed ({status}): {}", body.trim()),
            });
        }
        let fresh: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth(format!("unreadable token response: {e}")))?;

        let token = AccessToken {
            value: fresh.access_token,
            expires_at: Utc::now() + Duration::seconds(fresh.expires_in.unwrap_or(3600)),
        };
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, PipelineError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            return Err(auth(format!("{status}: {}", body.trim())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(transport(format!("{status}: {}", body.trim())));
        }
        response
            .json()
            .await
            .map_err(|e| transport(format!("unreadable response: {e}")))
    }

    async fn received_at(&self, id: &str) -> Result<DateTime<Utc>, PipelineError> {
        let meta = self
            .get_json(
                &format!("{API_ROOT}/messages/{id}"),
                &[("format", "minimal".to_string())],
            )
            .await?;
        meta.get("internalDate")
            .and_then(Value::as_str)
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| transport(format!("message {id} has no internalDate")))
    }
}

#[async_trait]
impl AttachmentSource for GmailSource {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn search_recent(&self, query: &SearchQuery) -> Result<Vec<MessageHandle>, PipelineError> {
        let q = gmail_query(query);
        info!("Searching Gmail: {}", q);
        let listing = self
            .get_json(
                &format!("{API_ROOT}/messages"),
                &[("q", q), ("maxResults", query.max_results.to_string())],
            )
            .await?;

        let ids: Vec<String> = listing
            .get("messages")
            .and_then(Value::as_array)
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let received_at = self.received_at(&id).await?;
            handles.push(MessageHandle { id, received_at });
        }
        info!("Gmail returned {} matching message(s)", handles.len());
        Ok(handles)
    }

    async fn fetch_attachments(
        &self,
        message: &MessageHandle,
    ) -> Result<Vec<Attachment>, PipelineError> {
        let full = self
            .get_json(&format!("{API_ROOT}/messages/{}", message.id), &[])
            .await?;
        let parts = full.get("payload").map(pdf_parts).unwrap_or_default();

        let mut attachments = Vec::with_capacity(parts.len());
        for part in parts {
            let data = match part.body {
                PartBody::Inline(data) => data,
                PartBody::Remote(attachment_id) => {
                    let body = self
                        .get_json(
                            &format!(
                                "{API_ROOT}/messages/{}/attachments/{attachment_id}",
                                message.id
                            ),
                            &[],
                        )
                        .await?;
                    attachment_data(&body, &part.filename)?
                }
            };
            let bytes = BASE64URL
                .decode(data.trim())
                .map_err(|e| transport(format!("attachment '{}': {e}", part.filename)))?;
            debug!("Downloaded {} ({} bytes)", part.filename, bytes.len());
            attachments.push(Attachment::new(part.filename, bytes));
        }
        Ok(attachments)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Gmail search string for the report message.
pub fn gmail_query(query: &SearchQuery) -> String {
    format!(
        "from:{} newer_than:{}d has:attachment filename:pdf subject:\"{}\"",
        query.sender,
        query.within_days,
        query.subject.replace('"', "")
    )
}

#[derive(Debug, PartialEq, Eq)]
enum PartBody {
    Inline(String),
    Remote(String),
}

#[derive(Debug, PartialEq, Eq)]
struct PdfPart {
    filename: String,
    body: PartBody,
}

/// The base64url `data` of an attachment response; absent or empty is an error.
fn attachment_data(body: &Value, filename: &str) -> Result<String, PipelineError> {
    body.get("data")
        .and_then(Value::as_str)
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| transport(format!("attachment '{filename}' has no data")))
}

/// Walk the MIME tree depth-first and collect parts named `*.pdf`.
fn pdf_parts(payload: &Value) -> Vec<PdfPart> {
    let mut found = Vec::new();
    walk_parts(payload, &mut found);
    found
}

fn walk_parts(part: &Value, found: &mut Vec<PdfPart>) {
    let filename = part.get("filename").and_then(Value::as_str).unwrap_or("");
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        let body = part.get("body");
        let remote = body
            .and_then(|b| b.get("attachmentId"))
            .and_then(Value::as_str);
        let inline = body.and_then(|b| b.get("data")).and_then(Value::as_str);
        let body = match (remote, inline) {
            (Some(id), _) => Some(PartBody::Remote(id.to_string())),
            (None, Some(data)) => Some(PartBody::Inline(data.to_string())),
            (None, None) => None,
        };
        if let Some(body) = body {
            found.push(PdfPart {
                filename: filename.to_string(),
                body,
            });
        }
    }
    if let Some(children) = part.get("parts").and_then(Value::as_array) {
        for child in children {
            walk_parts(child, found);
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let unreadable = |detail: String| PipelineError::CredentialsUnreadable {
        path: PathBuf::from(path),
        detail,
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))
}

fn auth(detail: String) -> PipelineError {
    PipelineError::SourceAuth {
        service: SERVICE.into(),
        detail,
    }
}

fn transport(detail: String) -> PipelineError {
    PipelineError::SourceTransport {
        service: SERVICE.into(),
        detail,
    }
}
