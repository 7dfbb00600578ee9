use crate::api::{ApiClient, ChannelMessage};
use crate::errors::VaultError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded-retry policy for page requests.
///
/// The wait for a rate-limited request comes from the API's guidance when
/// present, clamped to `max_wait`; `fallback_wait` covers transient errors
/// and rate limits with no guidance.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub fallback_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fallback_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying a rate-limited request, derived from the API's
    /// `retry_after` guidance (seconds, possibly fractional).
    fn rate_limit_wait(&self, retry_after: Option<f64>) -> Duration {
        match retry_after {
            Some(secs) if secs > 0.0 => Duration::from_secs_f64(secs).min(self.max_wait),
            _ => self.fallback_wait.min(self.max_wait),
        }
    }
}

/// Pages backward through a channel's message history.
///
/// Each successful page's oldest message id becomes the `before` cursor for
/// the next request, so pulling pages walks from newest toward oldest. The
/// sequence is finite: an empty page marks the history as exhausted, and
/// every later call returns `Ok(None)`.
pub struct MessageFetcher {
    api: Arc<ApiClient>,
    channel_id: String,
    cursor: Option<String>,
    exhausted: bool,
    page_limit: u32,
    request_delay: Duration,
    retry: RetryPolicy,
    pages_fetched: u64,
}

impl MessageFetcher {
    /// `resume_from` seeds the first cursor so a resumed run only fetches
    /// messages older than the checkpoint.
    pub fn new(
        api: Arc<ApiClient>,
        channel_id: impl Into<String>,
        resume_from: Option<String>,
        page_limit: u32,
        request_delay: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            channel_id: channel_id.into(),
            cursor: resume_from,
            exhausted: false,
            page_limit,
            request_delay,
            retry,
            pages_fetched: 0,
        }
    }

    /// Pull the next page of messages, in the exact order the API returned
    /// them (newest first). `Ok(None)` once the history is exhausted.
    ///
    /// Rate limits and transient API errors are retried in place, up to
    /// `RetryPolicy::max_attempts` per page; exhausting the attempts turns
    /// the last error into a fatal, non-retryable one.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ChannelMessage>>, VaultError> {
        if self.exhausted {
            return Ok(None);
        }

        // Politeness delay between successive page requests.
        if self.pages_fetched > 0 && !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let mut last_error: Option<VaultError> = None;
        for attempt in 0..self.retry.max_attempts {
            match self
                .api
                .fetch_messages(&self.channel_id, self.cursor.as_deref(), self.page_limit)
                .await
            {
                Ok(messages) => {
                    self.pages_fetched += 1;
                    if messages.is_empty() {
                        info!(channel_id = %self.channel_id, "message history exhausted");
                        self.exhausted = true;
                        return Ok(None);
                    }
                    // Oldest message on the page drives the next request.
                    self.cursor = messages.last().map(|m| m.id.clone());
                    return Ok(Some(messages));
                }
                Err(VaultError::RateLimit { retry_after }) => {
                    let wait = self.retry.rate_limit_wait(retry_after);
                    warn!(
                        channel_id = %self.channel_id,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, waiting before retrying page"
                    );
                    tokio::time::sleep(wait).await;
                    last_error = Some(VaultError::RateLimit { retry_after });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        channel_id = %self.channel_id,
                        attempt = attempt + 1,
                        error = %e,
                        "transient error fetching page, retrying"
                    );
                    tokio::time::sleep(self.retry.fallback_wait).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(VaultError::Api {
            message: format!(
                "giving up on channel {} after {} attempts: {}",
                self.channel_id,
                self.retry.max_attempts,
                last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
            ),
            retryable: false,
        })
    }
}
