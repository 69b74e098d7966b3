//! HTTP utilities for GCP REST API calls

use crate::config::RetryConfig;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and masks potentially sensitive patterns
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Failure of a single API call
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to send request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API request failed: {status} {message}")]
    Status { status: u16, message: String },

    #[error("failed to parse response JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("no access token: {0}")]
    Token(String),
}

impl ApiError {
    /// Transport errors, timeouts, throttling and server errors are worth
    /// another attempt; every other client error is final
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Parse(_) | ApiError::Token(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pull `error.message` out of a Google API error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .map(|m| sanitize_for_log(&m))
        .unwrap_or_default()
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
    retry: RetryConfig,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration, retry: RetryConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("gcp-inventory/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self { client, retry })
    }

    /// Make a GET request to a GCP API, retrying transient failures
    pub async fn get(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.get_once(url, token, query).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.calculate_backoff(attempt);
                    tracing::warn!(
                        "GET {} failed (attempt {}/{}): {} - retrying in {}ms",
                        url,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(ApiError::Parse)
    }

    /// Exponential backoff with full jitter
    fn calculate_backoff(&self, attempt: u32) -> u64 {
        let base = self.retry.initial_backoff_ms;
        let max = self.retry.max_backoff_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt));
        let capped = exponential.min(max);
        if capped == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=capped)
    }
}

fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        403 => Some("Permission denied (or API not enabled). Check your GCP IAM permissions."),
        401 => Some("Authentication failed. Delete the cached token and log in again."),
        404 => Some("Resource not found."),
        429 => Some("Rate limit exceeded. Please try again later."),
        400 => Some("Invalid request. Check your parameters."),
        s if s >= 500 => Some("GCP service temporarily unavailable. Please try again."),
        _ => None,
    }
}

/// Format a GCP API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_gcp_error(error: &ApiError) -> String {
    if let Some(hint) = error.status().and_then(status_hint) {
        return hint.to_string();
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

/// Log line for a failed listing: the API's own message, then the hint.
///
/// The message is what lets an operator retry the call by hand, e.g.
/// "Compute Engine API has not been used in project X".
pub fn describe_failure(error: &ApiError) -> String {
    match error.status().and_then(status_hint) {
        Some(hint) => format!("{} ({})", error, hint.trim_end_matches('.')),
        None => format_gcp_error(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_sanitize_truncates() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"code": 403, "message": "Compute Engine API has not been used"}}"#;
        assert_eq!(error_message(body), "Compute Engine API has not been used");
        assert_eq!(error_message("<html>"), "");
    }

    #[test]
    fn test_backoff_is_capped() {
        let client = GcpHttpClient::new(
            Duration::from_secs(1),
            RetryConfig {
                max_attempts: 10,
                initial_backoff_ms: 100,
                max_backoff_ms: 1_000,
            },
        )
        .unwrap();
        for attempt in 0..10 {
            assert!(client.calculate_backoff(attempt) <= 1_000);
        }
    }

    #[test]
    fn test_format_gcp_error() {
        assert!(format_gcp_error(&status(403)).starts_with("Permission denied"));
        assert!(format_gcp_error(&status(503)).contains("temporarily unavailable"));
        let token = ApiError::Token("boom".to_string());
        assert_eq!(format_gcp_error(&token), "no access token: boom");
    }

    #[test]
    fn test_describe_failure_keeps_api_message() {
        let err = ApiError::Status {
            status: 403,
            message: "Compute Engine API has not been used in project p1".to_string(),
        };
        let line = describe_failure(&err);
        assert!(line.contains("403 Compute Engine API has not been used in project p1"));
        assert!(line.contains("Permission denied"));

        // No hint for this status: the error is shown once
        let conflict = ApiError::Status {
            status: 409,
            message: "already exists".to_string(),
        };
        assert_eq!(describe_failure(&conflict), "API request failed: 409 already exists");
        assert_eq!(
            describe_failure(&ApiError::Token("boom".to_string())),
            "no access token: boom"
        );
    }
}
