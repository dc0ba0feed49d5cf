use thiserror::Error;

/// Top-level error type for Courtroom operations.
#[derive(Debug, Error)]
pub enum CourtroomError {
    // --- External collaborators (retried, then degraded) ---
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Search service error: {0}")]
    Search(String),

    #[error("Fact-check registry error: {0}")]
    Registry(String),

    #[error("Case store error: {0}")]
    Store(String),

    // --- Operational errors ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl CourtroomError {
    /// Whether this error comes from an external collaborator and should be
    /// retried or degraded rather than surfaced.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::LlmApi(_)
                | Self::Search(_)
                | Self::Registry(_)
                | Self::Store(_)
                | Self::CircuitOpen(_)
                | Self::Timeout(_)
        )
    }
}

/// Result type alias for Courtroom operations.
pub type Result<T> = std::result::Result<T, CourtroomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_classification() {
        assert!(CourtroomError::Search("down".into()).is_external());
        assert!(CourtroomError::Timeout("30s".into()).is_external());
        assert!(!CourtroomError::Config("bad".into()).is_external());
        assert!(!CourtroomError::Validation("claim_id".into()).is_external());
    }

    #[test]
    fn test_serde_error_converts() {
        fn parse(raw: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }
        let err = parse("{not json").unwrap_err();
        assert!(matches!(err, CourtroomError::Serialization(_)));
        assert!(!err.is_external());
        assert!(err.to_string().starts_with("Serialization error:"));
    }
}
