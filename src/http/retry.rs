//! Retry policy for mod downloads and index fetches.

use reqwest::StatusCode;

/// Maximum number of attempts for one network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// HTTP failures that a second attempt cannot fix.
#[derive(Debug, thiserror::Error)]
pub enum NonRetryableError {
    #[error("Rate limit exceeded by {0}. Try again later or set MODMAN_TOKEN.")]
    RateLimitExceeded(String),
    #[error("Authentication failed for {0}. Check MODMAN_TOKEN.")]
    AuthenticationFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Access forbidden: {0}")]
    Forbidden(String),
    #[error("Request error: HTTP {status} from {url}")]
    ClientError { status: u16, url: String },
}

/// Classify a reqwest error.
///
/// `Ok(())` means the failure is transient (connection problems, timeouts,
/// 5xx) and worth another attempt.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError {
            status: s.as_u16(),
            url,
        }),
        _ => Ok(()),
    }
}

/// Map an `error_for_status()` failure to an error the retry loop understands.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
