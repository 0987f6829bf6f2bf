//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table in the nodeflow schema, plus the cipher used to keep
//! credential values encrypted at rest. No business logic lives here.

pub mod crypto;
pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use crypto::CredentialCipher;
pub use pool::DbPool;
pub use error::DbError;
