//! Credential lookup used by executors that call authenticated providers.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider a credential authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialKind {
    #[serde(rename = "OPENAI")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi    => f.write_str("OPENAI"),
            Self::Anthropic => f.write_str("ANTHROPIC"),
            Self::Gemini    => f.write_str("GEMINI"),
        }
    }
}

/// A decrypted credential. Never log `value`.
#[derive(Clone)]
pub struct Credential {
    pub kind: CredentialKind,
    pub value: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CredentialLookupError {
    /// No credential with that id is owned by the user.
    #[error("credential not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// User-scoped credential lookup; values are decrypted just-in-time.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> Result<Credential, CredentialLookupError>;
}
