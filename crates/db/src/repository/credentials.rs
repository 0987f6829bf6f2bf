//! User-scoped credential storage. Values are encrypted before they reach
//! the database and decrypted only on lookup.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    CredentialCipher, DbError,
    models::{CredentialRow, CredentialType},
};

const CREDENTIAL_COLUMNS: &str =
    "id, user_id, name, credential_type, encrypted_value, created_at";

/// Encrypt and store a credential for `user_id`.
pub async fn create_credential(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    user_id: &str,
    name: &str,
    credential_type: CredentialType,
    value: &str,
) -> Result<CredentialRow, DbError> {
    let encrypted_value = cipher.encrypt(value)?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO credentials (id, user_id, name, credential_type, encrypted_value, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {CREDENTIAL_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(name)
    .bind(credential_type.to_string())
    .bind(encrypted_value)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;

    CredentialRow::from_row(&row)
}

/// Fetch a credential only if it belongs to `user_id`.
pub async fn get_credential(
    pool: &SqlitePool,
    id: Uuid,
    user_id: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ? AND user_id = ?"
    ))
    .bind(id.to_string())
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    CredentialRow::from_row(&row)
}

/// Fetch and decrypt a credential value for `user_id`.
pub async fn get_credential_value(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    id: Uuid,
    user_id: &str,
) -> Result<(CredentialType, String), DbError> {
    let row = get_credential(pool, id, user_id).await?;
    let value = cipher.decrypt(&row.encrypted_value)?;
    Ok((row.credential_type, value))
}
