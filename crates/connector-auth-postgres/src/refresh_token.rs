//! Refresh token storage.
//!
//! Tokens are stored by SHA-256 hash. Rotation revokes the predecessor and
//! inserts the successor in one transaction; the transaction is rolled back
//! when the predecessor is no longer active, so a lost race writes nothing.

use std::sync::Arc;

use async_trait::async_trait;
use connector_auth::storage::RefreshTokenStorage;
use connector_auth::types::RefreshToken;
use connector_auth::{AuthError, AuthResult};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{PgPool, StorageResult, map_unique_violation};

type TokenTuple = (
    Uuid,
    String,
    String,
    String,
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
);

fn token_from_tuple(row: TokenTuple) -> RefreshToken {
    RefreshToken {
        id: row.0,
        token_hash: row.1,
        client_id: row.2,
        user_id: row.3,
        tenant_id: row.4,
        scope: row.5,
        originating_authorization_code: row.6,
        created_at: row.7,
        expires_at: row.8,
        revoked_at: row.9,
    }
}

async fn insert_token<'e, E>(executor: E, token: &RefreshToken) -> StorageResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    query(
        r#"
        INSERT INTO oauth_refresh_token
            (id, token_hash, client_id, user_id, tenant_id, scope,
             originating_authorization_code, created_at, expires_at, revoked_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(token.id)
    .bind(&token.token_hash)
    .bind(&token.client_id)
    .bind(&token.user_id)
    .bind(&token.tenant_id)
    .bind(&token.scope)
    .bind(&token.originating_authorization_code)
    .bind(token.created_at)
    .bind(token.expires_at)
    .bind(token.revoked_at)
    .execute(executor)
    .await
    .map_err(|e| map_unique_violation(e, || "refresh token already exists".into()))?;

    Ok(())
}

/// PostgreSQL refresh token storage.
#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenStorage {
    /// Create a new refresh token storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find(&self, token_hash: &str) -> StorageResult<Option<RefreshToken>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT id, token_hash, client_id, user_id, tenant_id, scope,
                   originating_authorization_code, created_at, expires_at, revoked_at
            FROM oauth_refresh_token
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(token_from_tuple))
    }

    async fn rotate_in_transaction(
        &self,
        current_hash: &str,
        successor: &RefreshToken,
        now: OffsetDateTime,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        let revoked = query(
            r#"
            UPDATE oauth_refresh_token
            SET revoked_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(current_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            debug!("Refresh token rotation lost: predecessor no longer active");
            return Ok(false);
        }

        insert_token(&mut *tx, successor).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_chain(&self, code: &str, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            UPDATE oauth_refresh_token
            SET revoked_at = $2
            WHERE originating_authorization_code = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(code)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        insert_token(self.pool.as_ref(), token)
            .await
            .map_err(AuthError::from)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        self.find(token_hash).await.map_err(AuthError::from)
    }

    async fn rotate(
        &self,
        current_hash: &str,
        successor: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        self.rotate_in_transaction(current_hash, successor, now)
            .await
            .map_err(AuthError::from)
    }

    async fn revoke_by_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        self.revoke_chain(code, now).await.map_err(AuthError::from)
    }
}
