//! Errors raised at external provider boundaries.
//!
//! Every network collaborator (embedding, rerank, reasoning, search) reports
//! failures through [`ProviderError`] so the retry helper and the degradation
//! paths can classify them uniformly.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of an external provider call.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// The call did not complete within its deadline.
    #[error("{service} timed out after {timeout_ms} ms")]
    Timeout {
        /// Provider name.
        service: String,
        /// Deadline that expired.
        timeout_ms: u64,
    },
    /// Connection or protocol failure before a response was received.
    #[error("{service} transport error: {message}")]
    Transport {
        /// Provider name.
        service: String,
        /// Underlying error text.
        message: String,
    },
    /// The provider answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        /// Provider name.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// The response could not be decoded or violated the contract.
    #[error("{service} returned a malformed response: {message}")]
    Malformed {
        /// Provider name.
        service: String,
        /// What was wrong with the payload.
        message: String,
    },
}

impl ProviderError {
    /// Build a timeout error.
    #[must_use]
    pub fn timeout(service: &str, timeout: Duration) -> Self {
        Self::Timeout {
            service: service.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Build a transport error.
    #[must_use]
    pub fn transport(service: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Build a malformed-response error.
    #[must_use]
    pub fn malformed(service: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Build a status error, truncating the body for logs.
    #[must_use]
    pub fn status(service: &str, status: u16, body: &str) -> Self {
        Self::Status {
            service: service.to_string(),
            status,
            body: body.chars().take(200).collect(),
        }
    }

    /// Classify a `reqwest` failure.
    #[must_use]
    pub fn from_reqwest(service: &str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::timeout(service, timeout);
        }
        if let Some(status) = err.status() {
            return Self::status(service, status.as_u16(), &err.to_string());
        }
        if err.is_decode() {
            return Self::malformed(service, err.to_string());
        }
        Self::transport(service, err.to_string())
    }

    /// Provider name this error refers to.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Timeout { service, .. }
            | Self::Transport { service, .. }
            | Self::Status { service, .. }
            | Self::Malformed { service, .. } => service,
        }
    }

    /// Whether a second attempt may succeed.
    ///
    /// Timeouts, transport failures, rate limits and 5xx responses are
    /// transient. Client errors and malformed payloads are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } => false,
        }
    }

    /// Whether this error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ProviderError::timeout("rerank", Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::transport("rerank", "reset").is_retryable());
        assert!(ProviderError::status("rerank", 503, "busy").is_retryable());
        assert!(ProviderError::status("rerank", 429, "slow down").is_retryable());
        assert!(!ProviderError::status("rerank", 401, "bad key").is_retryable());
        assert!(!ProviderError::malformed("rerank", "no results").is_retryable());
    }

    #[test]
    fn test_status_body_is_truncated() {
        let body = "x".repeat(1000);
        let err = ProviderError::status("search", 500, &body);
        match err {
            ProviderError::Status { body, .. } => assert_eq!(body.len(), 200),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = ProviderError::timeout("embedding", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "embedding timed out after 1500 ms");
        assert_eq!(err.service(), "embedding");
        assert!(err.is_timeout());
    }
}
