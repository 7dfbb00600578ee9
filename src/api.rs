use crate::errors::VaultError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Maximum attachment size accepted for download (100 MB).
const MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;

/// One message record as delivered by the remote API, already validated.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Remote-assigned, monotonically-ordered id. Doubles as pagination
    /// cursor and checkpoint value.
    pub id: String,
    pub timestamp: String,
    pub author: String,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
}

/// Thin client for the Discord-compatible message-list endpoint.
///
/// Not a general-purpose API abstraction: it exposes exactly the two
/// operations the backup needs (list a page of messages, fetch raw bytes).
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: default_http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Fetch one page of messages for a channel, newest first.
    ///
    /// `before` walks the history backward: the API returns only messages
    /// older than the given id. Malformed records are skipped with a warning
    /// rather than failing the page.
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ChannelMessage>, VaultError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let mut req = self
            .http
            .get(&url)
            .header("Authorization", &self.token)
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = before {
            req = req.query(&[("before", cursor)]);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;
        let resp = check_status(resp, channel_id).await?;

        let records: Vec<Value> = resp
            .json()
            .await
            .context("Failed to parse message list response")?;

        let mut messages = Vec::with_capacity(records.len());
        for record in &records {
            match parse_message(record) {
                Some(msg) => messages.push(msg),
                None => warn!(channel_id, "skipping malformed message record"),
            }
        }
        Ok(messages)
    }

    /// Fetch raw bytes from an attachment URL.
    ///
    /// Attachment CDN URLs are pre-signed, so no Authorization header is sent.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, VaultError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;
        let resp = match check_status(resp, url).await {
            Ok(resp) => resp,
            // A deleted attachment is not a missing channel.
            Err(VaultError::ChannelNotFound(subject)) => {
                return Err(VaultError::Api {
                    message: format!("attachment not found: {}", subject),
                    retryable: false,
                });
            }
            Err(e) => return Err(e),
        };

        if let Some(len) = resp.content_length()
            && len > MAX_ATTACHMENT_BYTES
        {
            return Err(VaultError::Api {
                message: format!("attachment too large: {} bytes", len),
                retryable: false,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 60 s overall).
///
/// Falls back to the default client if the builder fails.
fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map an HTTP error status to a typed error.
///
/// 429 becomes `RateLimit` with the wait taken from the `Retry-After` header,
/// falling back to a `retry_after` field in the JSON body. 401/403 become
/// `Auth`, 404 becomes `ChannelNotFound`, 5xx are retryable `Api` errors.
/// On success, returns the response unchanged for further processing.
async fn check_status(
    resp: reqwest::Response,
    subject: &str,
) -> Result<reqwest::Response, VaultError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let header_retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok());

    let error_text = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = header_retry_after.or_else(|| {
            serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|v| v.get("retry_after").and_then(Value::as_f64))
        });
        warn!(subject, ?retry_after, "rate limit hit");
        return Err(VaultError::RateLimit { retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(VaultError::Auth(format!(
            "status {}: {}",
            status.as_u16(),
            error_text
        )));
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(VaultError::ChannelNotFound(subject.to_string()));
    }

    let retryable = status.is_server_error();
    Err(VaultError::Api {
        message: format!("status {}: {}", status.as_u16(), error_text),
        retryable,
    })
}

/// Validate and convert one raw API record into a `ChannelMessage`.
///
/// Returns `None` when any of the required fields (`id`, `timestamp`,
/// `author.username`) is missing or not a string. Missing `content` is an
/// empty body, not an error (attachment-only messages have no text).
pub fn parse_message(record: &Value) -> Option<ChannelMessage> {
    let id = record.get("id")?.as_str()?.to_string();
    let timestamp = record.get("timestamp")?.as_str()?.to_string();
    let author = record.get("author")?.get("username")?.as_str()?.to_string();
    let content = record
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let attachments = record
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|a| {
                    let url = a.get("url")?.as_str()?.to_string();
                    let filename = a
                        .get("filename")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| filename_from_url(&url));
                    Some(AttachmentRef { url, filename })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ChannelMessage {
        id,
        timestamp,
        author,
        content,
        attachments,
    })
}

/// Derive a filename from the last path segment of an attachment URL.
fn filename_from_url(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "attachment.bin".to_string())
}
