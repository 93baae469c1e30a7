//! In-memory storages for tests.
//!
//! Each storage keeps its records behind one async lock, so the conditional
//! updates are atomic within a process. They are not shared across instances
//! and must never back a deployed server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage};
use crate::types::{AuthorizationCode, Client, RefreshToken};

/// Client registry backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryClientStorage {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `clients`.
    #[must_use]
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let clients = clients
            .into_iter()
            .map(|c| (c.client_id.clone(), c))
            .collect();
        Self {
            clients: RwLock::new(clients),
        }
    }

    /// Adds or replaces a client.
    pub async fn insert(&self, client: Client) {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientStorage for InMemoryClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }
}

/// Authorization codes keyed by code value.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationCodeStorage {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

impl InMemoryAuthorizationCodeStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored codes, in any state.
    pub async fn len(&self) -> usize {
        self.codes.read().await.len()
    }

    /// Returns `true` if no code has been stored.
    pub async fn is_empty(&self) -> bool {
        self.codes.read().await.is_empty()
    }

    /// Overwrites a stored record. Lets tests move a code into any state.
    pub async fn put(&self, code: AuthorizationCode) {
        self.codes.write().await.insert(code.code.clone(), code);
    }
}

#[async_trait]
impl AuthorizationCodeStorage for InMemoryAuthorizationCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        let mut codes = self.codes.write().await;
        if codes.contains_key(&code.code) {
            return Err(AuthError::storage("duplicate authorization code"));
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>> {
        Ok(self.codes.read().await.get(code).cloned())
    }

    async fn claim(
        &self,
        code: &str,
        user_id: &str,
        tenant_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let mut codes = self.codes.write().await;
        match codes.get_mut(code) {
            Some(record)
                if record.user_id.is_none()
                    && record.used_at.is_none()
                    && record.denied_at.is_none()
                    && !record.is_expired_at(now) =>
            {
                record.user_id = Some(user_id.to_string());
                record.tenant_id = tenant_id.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_used(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool> {
        let mut codes = self.codes.write().await;
        match codes.get_mut(code) {
            Some(record) if record.used_at.is_none() => {
                record.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deny(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool> {
        let mut codes = self.codes.write().await;
        match codes.get_mut(code) {
            Some(record)
                if record.user_id.is_none()
                    && record.used_at.is_none()
                    && record.denied_at.is_none() =>
            {
                record.denied_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Refresh tokens keyed by hash.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored tokens, in no particular order.
    pub async fn all(&self) -> Vec<RefreshToken> {
        self.tokens.read().await.values().cloned().collect()
    }

    /// Tokens that are neither revoked nor expired.
    pub async fn active(&self) -> Vec<RefreshToken> {
        let now = OffsetDateTime::now_utc();
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| !t.is_revoked() && !t.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Overwrites a stored record.
    pub async fn put(&self, token: RefreshToken) {
        self.tokens
            .write()
            .await
            .insert(token.token_hash.clone(), token);
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(AuthError::storage("duplicate refresh token hash"));
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        current_hash: &str,
        successor: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&successor.token_hash) {
            return Err(AuthError::storage("duplicate refresh token hash"));
        }
        match tokens.get_mut(current_hash) {
            Some(current) if current.revoked_at.is_none() && !current.is_expired_at(now) => {
                current.revoked_at = Some(now);
            }
            _ => return Ok(false),
        }
        tokens.insert(successor.token_hash.clone(), successor.clone());
        Ok(true)
    }

    async fn revoke_by_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let mut revoked = 0;
        for token in self.tokens.write().await.values_mut() {
            if token.originating_authorization_code == code && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

/// Client registry that answers only after a fixed delay.
///
/// Used to exercise request deadlines.
#[derive(Debug)]
pub struct SlowClientStorage<S> {
    inner: S,
    delay: Duration,
}

impl<S> SlowClientStorage<S> {
    /// Wraps `inner`, delaying every lookup by `delay`.
    #[must_use]
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<S: ClientStorage> ClientStorage for SlowClientStorage<S> {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_client_id(client_id).await
    }
}

/// Refresh token store whose inserts land only after a fixed delay.
///
/// Widens the window between the steps of a code redemption so tests can
/// interleave a second request.
#[derive(Debug)]
pub struct SlowRefreshTokenStorage<S> {
    inner: Arc<S>,
    delay: Duration,
}

impl<S> SlowRefreshTokenStorage<S> {
    /// Wraps `inner`, delaying every `create` by `delay`.
    #[must_use]
    pub fn new(inner: Arc<S>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<S: RefreshTokenStorage> RefreshTokenStorage for SlowRefreshTokenStorage<S> {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(token).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        self.inner.find_by_hash(token_hash).await
    }

    async fn rotate(
        &self,
        current_hash: &str,
        successor: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        self.inner.rotate(current_hash, successor, now).await
    }

    async fn revoke_by_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        self.inner.revoke_by_authorization_code(code, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;
    use uuid::Uuid;

    fn code(expires_in: TimeDuration) -> AuthorizationCode {
        let now = OffsetDateTime::now_utc();
        AuthorizationCode {
            code: "C1".to_string(),
            client_id: "cli_1".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            scope: String::new(),
            state: "s".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            tenant_id: "t0".to_string(),
            user_id: None,
            created_at: now,
            expires_at: now + expires_in,
            used_at: None,
            denied_at: None,
        }
    }

    fn token(hash: &str) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash.to_string(),
            client_id: "cli_1".to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            scope: "a b".to_string(),
            originating_authorization_code: "C1".to_string(),
            created_at: now,
            expires_at: now + TimeDuration::days(30),
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_claim_once() {
        let storage = InMemoryAuthorizationCodeStorage::new();
        storage.create(&code(TimeDuration::minutes(10))).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(storage.claim("C1", "u1", "t1", now).await.unwrap());
        assert!(!storage.claim("C1", "u2", "t2", now).await.unwrap());

        let stored = storage.find_by_code("C1").await.unwrap().unwrap();
        assert_eq!(stored.user_id.as_deref(), Some("u1"));
        assert_eq!(stored.tenant_id, "t1");
    }

    #[tokio::test]
    async fn test_claim_expired_fails() {
        let storage = InMemoryAuthorizationCodeStorage::new();
        storage.create(&code(TimeDuration::seconds(-1))).await.unwrap();
        let claimed = storage
            .claim("C1", "u1", "t1", OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(!claimed);
    }

    #[tokio::test]
    async fn test_deny_is_final() {
        let storage = InMemoryAuthorizationCodeStorage::new();
        storage.create(&code(TimeDuration::minutes(10))).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(storage.deny("C1", now).await.unwrap());
        assert!(!storage.deny("C1", now).await.unwrap());
        assert!(!storage.claim("C1", "u1", "t1", now).await.unwrap());

        let stored = storage.find_by_code("C1").await.unwrap().unwrap();
        assert!(stored.is_denied());
        assert!(stored.user_id.is_none());
    }

    #[tokio::test]
    async fn test_deny_after_claim_fails() {
        let storage = InMemoryAuthorizationCodeStorage::new();
        storage.create(&code(TimeDuration::minutes(10))).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(storage.claim("C1", "u1", "t1", now).await.unwrap());
        assert!(!storage.deny("C1", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_used_once() {
        let storage = InMemoryAuthorizationCodeStorage::new();
        storage.create(&code(TimeDuration::minutes(10))).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(storage.mark_used("C1", now).await.unwrap());
        assert!(!storage.mark_used("C1", now).await.unwrap());
        assert!(!storage.mark_used("missing", now).await.unwrap());
        assert!(storage.create(&code(TimeDuration::minutes(1))).await.is_err());
    }

    #[tokio::test]
    async fn test_rotate_once() {
        let storage = InMemoryRefreshTokenStorage::new();
        storage.create(&token("h1")).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(storage.rotate("h1", &token("h2"), now).await.unwrap());
        assert!(!storage.rotate("h1", &token("h3"), now).await.unwrap());

        let active = storage.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_hash, "h2");
        assert!(storage.find_by_hash("h3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_by_authorization_code() {
        let storage = InMemoryRefreshTokenStorage::new();
        storage.create(&token("h1")).await.unwrap();
        let mut other = token("h2");
        other.originating_authorization_code = "C2".to_string();
        storage.create(&other).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert_eq!(storage.revoke_by_authorization_code("C1", now).await.unwrap(), 1);
        assert_eq!(storage.revoke_by_authorization_code("C1", now).await.unwrap(), 0);
        assert_eq!(storage.active().await.len(), 1);
    }
}
