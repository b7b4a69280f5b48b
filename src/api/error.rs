use thiserror::Error;

/// Everything that can go wrong talking to the exchange.
///
/// The throttle uses `is_retryable` to decide whether a failed call gets
/// another attempt; everything else is surfaced to the caller immediately.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure (connect, timeout, TLS). Retryable.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The exchange told us to slow down (HTTP 429/418). Retryable.
    #[error("rate limited by exchange")]
    RateLimited,

    /// Application-level rejection: bad parameters, insufficient balance,
    /// precision violation. Never retried.
    #[error("exchange rejection ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Credentials missing, invalid or expired. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Symbol absent from the exchange instrument catalog.
    #[error("instrument {0} not found")]
    InstrumentNotFound(String),

    /// The exchange answered with something we could not interpret.
    #[error("malformed exchange response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Transient failures worth another attempt after a fixed delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(GatewayError::RateLimited.is_retryable());
    }

    #[test]
    fn test_rejection_is_not_retryable() {
        let err = GatewayError::Rejected {
            code: -2019,
            message: "Margin is insufficient".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_and_not_found_are_not_retryable() {
        assert!(!GatewayError::Auth("bad key".to_string()).is_retryable());
        assert!(!GatewayError::InstrumentNotFound("NOPEUSDT".to_string()).is_retryable());
        assert!(!GatewayError::Malformed("truncated body".to_string()).is_retryable());
    }
}
