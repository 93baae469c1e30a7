//! Authorization code storage.
//!
//! Codes move `unclaimed → claimed → redeemed`, or `unclaimed → denied`,
//! through conditional updates; a row is never deleted.

use std::sync::Arc;

use async_trait::async_trait;
use connector_auth::storage::AuthorizationCodeStorage;
use connector_auth::types::AuthorizationCode;
use connector_auth::{AuthError, AuthResult};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::{PgPool, StorageResult, map_unique_violation};

type CodeTuple = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
);

fn code_from_tuple(row: CodeTuple) -> AuthorizationCode {
    AuthorizationCode {
        code: row.0,
        client_id: row.1,
        redirect_uri: row.2,
        scope: row.3,
        state: row.4,
        code_challenge: row.5,
        code_challenge_method: row.6,
        tenant_id: row.7,
        user_id: row.8,
        created_at: row.9,
        expires_at: row.10,
        used_at: row.11,
        denied_at: row.12,
    }
}

/// PostgreSQL authorization code storage.
#[derive(Debug, Clone)]
pub struct PostgresAuthorizationCodeStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthorizationCodeStorage {
    /// Create a new authorization code storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn insert(&self, code: &AuthorizationCode) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO oauth_authorization_code
                (code, client_id, redirect_uri, scope, state, code_challenge,
                 code_challenge_method, tenant_id, user_id, created_at, expires_at, used_at,
                 denied_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.state)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.tenant_id)
        .bind(&code.user_id)
        .bind(code.created_at)
        .bind(code.expires_at)
        .bind(code.used_at)
        .bind(code.denied_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_unique_violation(e, || "authorization code already exists".into()))?;

        Ok(())
    }

    async fn find(&self, code: &str) -> StorageResult<Option<AuthorizationCode>> {
        let row: Option<CodeTuple> = query_as(
            r#"
            SELECT code, client_id, redirect_uri, scope, state, code_challenge,
                   code_challenge_method, tenant_id, user_id, created_at, expires_at, used_at,
                   denied_at
            FROM oauth_authorization_code
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(code_from_tuple))
    }

    async fn claim_code(
        &self,
        code: &str,
        user_id: &str,
        tenant_id: &str,
        now: OffsetDateTime,
    ) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE oauth_authorization_code
            SET user_id = $2, tenant_id = $3
            WHERE code = $1
              AND user_id IS NULL
              AND used_at IS NULL
              AND denied_at IS NULL
              AND expires_at > $4
            "#,
        )
        .bind(code)
        .bind(user_id)
        .bind(tenant_id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn redeem(&self, code: &str, now: OffsetDateTime) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE oauth_authorization_code
            SET used_at = $2
            WHERE code = $1
              AND used_at IS NULL
            "#,
        )
        .bind(code)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn deny_code(&self, code: &str, now: OffsetDateTime) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE oauth_authorization_code
            SET denied_at = $2
            WHERE code = $1
              AND user_id IS NULL
              AND used_at IS NULL
              AND denied_at IS NULL
            "#,
        )
        .bind(code)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AuthorizationCodeStorage for PostgresAuthorizationCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.insert(code).await.map_err(AuthError::from)
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>> {
        self.find(code).await.map_err(AuthError::from)
    }

    async fn claim(
        &self,
        code: &str,
        user_id: &str,
        tenant_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        self.claim_code(code, user_id, tenant_id, now)
            .await
            .map_err(AuthError::from)
    }

    async fn mark_used(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool> {
        self.redeem(code, now).await.map_err(AuthError::from)
    }

    async fn deny(&self, code: &str, now: OffsetDateTime) -> AuthResult<bool> {
        self.deny_code(code, now).await.map_err(AuthError::from)
    }
}
