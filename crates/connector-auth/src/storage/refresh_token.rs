//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Rotation and revocation must be atomic and immediate

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::RefreshToken;

/// Storage trait for refresh tokens.
///
/// # Implementations
///
/// - `connector-auth-postgres` - PostgreSQL storage backend
/// - `connector_auth::testing::InMemoryRefreshTokenStorage` - tests only
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored (e.g., duplicate hash,
    /// storage unavailable).
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by its hash.
    ///
    /// Returns tokens regardless of expiration/revocation status; callers
    /// check validity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Revokes `current_hash` and stores `successor` as one atomic unit.
    ///
    /// The revoke applies only while the current token is unrevoked and
    /// unexpired as of `now`. If it does not apply, nothing is written.
    ///
    /// # Returns
    ///
    /// `true` if the rotation happened; `false` if the current token was no
    /// longer active (a concurrent rotation or a revocation won).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. Nothing is written in
    /// that case.
    async fn rotate(
        &self,
        current_hash: &str,
        successor: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Revokes every still-active token descending from an authorization code.
    ///
    /// # Returns
    ///
    /// Returns the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn revoke_by_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64>;
}
