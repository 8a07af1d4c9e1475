//! Error classification for the generative HTTP client.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmApiError {
    #[error("Rate limited (429): {0}")]
    RateLimited(String),

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid request ({status}): {body}")]
    InvalidRequest { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl LlmApiError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ServerError { .. } | Self::Timeout(_) | Self::NetworkError(_)
        )
    }

    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            429 => Self::RateLimited(body),
            401 | 403 => Self::AuthFailed(body),
            500..=599 => Self::ServerError { status: status.as_u16(), body },
            _ => Self::InvalidRequest { status: status.as_u16(), body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmApiError::RateLimited("slow down".into()).is_transient());
        assert!(LlmApiError::ServerError { status: 503, body: String::new() }.is_transient());
        assert!(LlmApiError::Timeout(300).is_transient());
        assert!(!LlmApiError::AuthFailed("bad key".into()).is_transient());
        assert!(
            !LlmApiError::InvalidRequest { status: 400, body: String::new() }.is_transient()
        );
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            LlmApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmApiError::RateLimited(_)
        ));
        assert!(matches!(
            LlmApiError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            LlmApiError::AuthFailed(_)
        ));
        assert!(matches!(
            LlmApiError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            LlmApiError::ServerError { status: 502, .. }
        ));
    }
}
