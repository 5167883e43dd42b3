use thiserror::Error;

/// Errors returned by the playback provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Access token rejected (401). Never retried verbatim.
    #[error("access token rejected")]
    Unauthorized,

    /// Target device is not registered with the provider (404).
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Too many requests (429).
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Provider returned another non-success status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Provider answered with a body we could not read.
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

/// Convenient Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Unauthorized)
    }

    /// Returns true if this error is transient and the call should be retried.
    ///
    /// Timeouts, connection failures, rate limiting and 5xx responses are
    /// transient; 403 (e.g. account without premium) is not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            ProviderError::RateLimited { .. } => true,
            ProviderError::HttpStatus(status, _) => (500..600).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::HttpStatus(502, String::new()).is_transient());
        assert!(ProviderError::RateLimited {
            retry_after_secs: Some(1)
        }
        .is_transient());
        assert!(!ProviderError::HttpStatus(403, String::new()).is_transient());
        assert!(!ProviderError::Unauthorized.is_transient());
        assert!(ProviderError::Unauthorized.is_unauthorized());
    }
}
