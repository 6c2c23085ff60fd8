use thiserror::Error;

/// Core error taxonomy. Raised at the source (embedder, store, generation
/// client); the route layer matches on the variant to author user-facing
/// copy. Variants never carry prompt content, only diagnostic detail such as
/// the endpoint URL and retry count.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Retrieval ran successfully but found nothing relevant.
    #[error("no relevant context found")]
    NoContext,

    /// The document store or embedder failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The generation endpoint did not respond within the timeout.
    #[error("generation timed out after {attempts} attempts (endpoint: {endpoint})")]
    GenerationTimeout { endpoint: String, attempts: u32 },

    /// Could not reach the generation endpoint at all.
    #[error("could not connect to generation endpoint {endpoint} after {attempts} attempts")]
    GenerationConnection { endpoint: String, attempts: u32 },

    /// The endpoint answered with a well-formed but empty completion.
    #[error("empty response from generation endpoint {endpoint} after {attempts} attempts")]
    GenerationEmpty { endpoint: String, attempts: u32 },

    /// The endpoint responded but the body could not be parsed.
    #[error("malformed response from generation endpoint {endpoint}: {detail}")]
    GenerationMalformed { endpoint: String, detail: String },

    /// Non-transient upstream generation failure (HTTP error status,
    /// unsupported provider).
    #[error("generation failed (endpoint: {endpoint}): {detail}")]
    Generation { endpoint: String, detail: String },

    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl AssistantError {
    /// Whether a generation attempt that produced this error is worth
    /// retrying. Connection problems, timeouts, malformed bodies and empty
    /// completions tend to be transient (model cold starts); HTTP error
    /// statuses and anything else fail immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::GenerationTimeout { .. }
                | AssistantError::GenerationConnection { .. }
                | AssistantError::GenerationEmpty { .. }
                | AssistantError::GenerationMalformed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(AssistantError::GenerationTimeout {
            endpoint: "http://localhost:11434".into(),
            attempts: 1
        }
        .is_retryable());
        assert!(AssistantError::GenerationConnection {
            endpoint: "http://localhost:11434".into(),
            attempts: 1
        }
        .is_retryable());
        assert!(AssistantError::GenerationEmpty {
            endpoint: "http://localhost:11434".into(),
            attempts: 1
        }
        .is_retryable());
        assert!(AssistantError::GenerationMalformed {
            endpoint: "http://localhost:11434".into(),
            detail: "invalid JSON".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_non_retryable_variants() {
        assert!(!AssistantError::NoContext.is_retryable());
        assert!(!AssistantError::Retrieval("store down".into()).is_retryable());
        assert!(!AssistantError::Unknown("?".into()).is_retryable());
        // An HTTP error status (401, 500) will not improve on retry
        assert!(!AssistantError::Generation {
            endpoint: "http://localhost:11434".into(),
            detail: "status 401".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display_carries_endpoint_not_prompt() {
        let err = AssistantError::GenerationTimeout {
            endpoint: "http://ollama:11434".into(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("http://ollama:11434"));
        assert!(msg.contains("3 attempts"));
    }
}
