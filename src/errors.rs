use thiserror::Error;

/// Typed error hierarchy for chanvault.
///
/// Used at module boundaries (API calls, checkpoint and artifact I/O).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal`
/// variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {message}")]
    Api { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<f64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using VaultError.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    /// Whether this error is retryable (rate limits, transient API errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            VaultError::RateLimit { .. } => true,
            VaultError::Api { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
