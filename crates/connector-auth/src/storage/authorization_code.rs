//! Authorization code storage trait.
//!
//! # State Transitions
//!
//! Every mutation is a conditional update. An implementation must apply the
//! change and report `true` only if the record was still in the expected state
//! at the moment of the write; two concurrent callers can never both win.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::AuthorizationCode;

/// Storage for authorization codes.
#[async_trait]
pub trait AuthorizationCodeStorage: Send + Sync {
    /// Persists a freshly issued, unclaimed code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code already exists or the storage operation fails.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Finds a code regardless of its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>>;

    /// Binds the approving user and tenant to an unclaimed code.
    ///
    /// Applies only while `user_id`, `used_at` and `denied_at` are unset and the
    /// code has not expired as of `now`.
    ///
    /// # Returns
    ///
    /// `true` if this call claimed the code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn claim(
        &self,
        code: &str,
        user_id: &str,
        tenant_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Marks a code redeemed.
    ///
    /// Applies only while `used_at` is unset.
    ///
    /// # Returns
    ///
    /// `true` if this call redeemed the code. `false` means another redemption
    /// got there first, which the caller must treat as a replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_used(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool>;

    /// Records that the user refused an unclaimed code.
    ///
    /// Applies only while `user_id`, `used_at` and `denied_at` are unset. A
    /// denied code can never be claimed afterwards.
    ///
    /// # Returns
    ///
    /// `true` if this call denied the code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn deny(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool>;
}
