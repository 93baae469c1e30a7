//! PostgreSQL storage backend for connector-auth.
//!
//! Provides persistent storage for:
//!
//! - OAuth clients (`oauth_client`, read-only from the server's point of view)
//! - Authorization codes (`oauth_authorization_code`)
//! - Refresh tokens (`oauth_refresh_token`)
//!
//! Every state transition is a single conditional `UPDATE` (compare-and-set on
//! `user_id`, `used_at` or `revoked_at`), so concurrent requests served by any
//! number of instances observe exactly one winner. Refresh rotation runs the
//! revoke and the insert in one transaction.
//!
//! # Example
//!
//! ```ignore
//! use connector_auth_postgres::{PostgresAuthStorage, PostgresConfig};
//!
//! let storage = PostgresAuthStorage::connect(&PostgresConfig::new(url)).await?;
//! storage.migrate().await?;
//!
//! let clients = storage.clients();
//! let client = clients.find_by_client_id("cli_1").await?;
//! ```

pub mod authorization_code;
pub mod client;
pub mod migrations;
pub mod pool;
pub mod refresh_token;

use std::sync::Arc;

use connector_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use authorization_code::PostgresAuthorizationCodeStorage;
pub use client::PostgresClientStorage;
pub use pool::{PostgresConfig, create_pool};
pub use refresh_token::PostgresRefreshTokenStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidInput(_)
        )
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Migration(_)
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Maps a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn map_unique_violation(err: sqlx_core::Error, what: impl FnOnce() -> String) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StorageError::conflict(what());
    }
    StorageError::from(err)
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authorization data.
///
/// Holds a connection pool and hands out `Arc`-owning storages that implement
/// the `connector_auth::storage` traits.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Client registry storage.
    #[must_use]
    pub fn clients(&self) -> PostgresClientStorage {
        PostgresClientStorage::new(Arc::clone(&self.pool))
    }

    /// Authorization code storage.
    #[must_use]
    pub fn authorization_codes(&self) -> PostgresAuthorizationCodeStorage {
        PostgresAuthorizationCodeStorage::new(Arc::clone(&self.pool))
    }

    /// Refresh token storage.
    #[must_use]
    pub fn refresh_tokens(&self) -> PostgresRefreshTokenStorage {
        PostgresRefreshTokenStorage::new(Arc::clone(&self.pool))
    }
}
