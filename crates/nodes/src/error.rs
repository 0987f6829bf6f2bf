//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node executor.
///
/// The step layer uses [`NodeError::is_retryable`] to decide retry behaviour:
/// - `External { retryable: true }` is re-attempted with exponential back-off.
/// - Everything else fails the node immediately.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// Missing or invalid node configuration, including templates that
    /// render to an empty value.
    #[error("{0}")]
    Validation(String),

    /// A referenced credential is absent, of the wrong kind, or unreadable.
    #[error("{0}")]
    Credential(String),

    /// An outbound call failed.
    #[error("{message}")]
    External { message: String, retryable: bool },

    /// A retryable step kept failing until its retry budget ran out.
    #[error("step '{step}' failed after {attempts} attempts: {message}")]
    RetryExhausted {
        step: String,
        attempts: u32,
        message: String,
    },
}

impl NodeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    /// Transient outbound failure (network, 429, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::External {
            message: message.into(),
            retryable: true,
        }
    }

    /// Outbound failure that will not improve on retry (4xx, bad payload).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::External {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::External { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_external_errors_retry() {
        assert!(NodeError::transient("503").is_retryable());
        assert!(!NodeError::permanent("404").is_retryable());
        assert!(!NodeError::validation("missing endpoint").is_retryable());
        assert!(!NodeError::credential("missing key").is_retryable());
        assert!(!NodeError::RetryExhausted {
            step: "http-request".into(),
            attempts: 4,
            message: "503".into(),
        }
        .is_retryable());
    }

    #[test]
    fn retry_exhausted_names_the_step() {
        let err = NodeError::RetryExhausted {
            step: "n1:http-request".into(),
            attempts: 3,
            message: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "step 'n1:http-request' failed after 3 attempts: HTTP 503"
        );
    }
}
