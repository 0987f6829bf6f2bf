//! Database-backed credential store for executors.

use async_trait::async_trait;
use db::{models::CredentialType, repository::credentials, CredentialCipher, DbError, DbPool};
use nodes::{Credential, CredentialKind, CredentialLookupError, CredentialStore};
use tracing::warn;
use uuid::Uuid;

/// Looks credentials up in the `credentials` table and decrypts them on
/// demand.
pub struct DbCredentialStore {
    pool: DbPool,
    cipher: CredentialCipher,
}

impl DbCredentialStore {
    pub fn new(pool: DbPool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }
}

fn kind_of(credential_type: CredentialType) -> CredentialKind {
    match credential_type {
        CredentialType::OpenAi    => CredentialKind::OpenAi,
        CredentialType::Anthropic => CredentialKind::Anthropic,
        CredentialType::Gemini    => CredentialKind::Gemini,
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn get_credential(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> Result<Credential, CredentialLookupError> {
        // Ids are UUIDs; anything else cannot exist.
        let Ok(id) = Uuid::parse_str(credential_id) else {
            return Err(CredentialLookupError::NotFound);
        };

        match credentials::get_credential_value(&self.pool, &self.cipher, id, user_id).await {
            Ok((credential_type, value)) => Ok(Credential {
                kind: kind_of(credential_type),
                value,
            }),
            Err(DbError::NotFound) => Err(CredentialLookupError::NotFound),
            Err(e) => {
                warn!(credential_id, error = %e, "credential lookup failed");
                Err(CredentialLookupError::Unavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::pool::create_memory_pool;

    #[tokio::test]
    async fn looks_up_and_decrypts_user_credentials() {
        let pool = create_memory_pool().await.unwrap();
        let cipher = CredentialCipher::from_secret("k");
        let row = credentials::create_credential(
            &pool,
            &cipher,
            "alice",
            "gemini",
            CredentialType::Gemini,
            "g-secret",
        )
        .await
        .unwrap();

        let store = DbCredentialStore::new(pool, cipher);
        let credential = store.get_credential(&row.id.to_string(), "alice").await.unwrap();
        assert_eq!(credential.kind, CredentialKind::Gemini);
        assert_eq!(credential.value, "g-secret");

        assert!(matches!(
            store.get_credential(&row.id.to_string(), "bob").await,
            Err(CredentialLookupError::NotFound)
        ));
        assert!(matches!(
            store.get_credential("not-a-uuid", "alice").await,
            Err(CredentialLookupError::NotFound)
        ));
    }

    #[tokio::test]
    async fn wrong_key_is_reported_as_unavailable() {
        let pool = create_memory_pool().await.unwrap();
        let row = credentials::create_credential(
            &pool,
            &CredentialCipher::from_secret("old"),
            "alice",
            "openai",
            CredentialType::OpenAi,
            "sk",
        )
        .await
        .unwrap();

        let store = DbCredentialStore::new(pool, CredentialCipher::from_secret("new"));
        assert!(matches!(
            store.get_credential(&row.id.to_string(), "alice").await,
            Err(CredentialLookupError::Unavailable(_))
        ));
    }
}
