//! Client registry storage.
//!
//! Registrations are owned by the external tenant registry; the server only
//! reads them. [`PostgresClientStorage::upsert`] exists for provisioning
//! tooling and tests.

use std::sync::Arc;

use async_trait::async_trait;
use connector_auth::storage::ClientStorage;
use connector_auth::types::Client;
use connector_auth::{AuthError, AuthResult};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::{PgPool, StorageError, StorageResult};

type ClientTuple = (String, String, Option<String>, Vec<String>, bool);

fn client_from_tuple(row: ClientTuple) -> Client {
    Client {
        client_id: row.0,
        tenant_id: row.1,
        secret_hash: row.2,
        allowed_redirect_uris: row.3,
        is_active: row.4,
    }
}

/// PostgreSQL client storage.
#[derive(Debug, Clone)]
pub struct PostgresClientStorage {
    pool: Arc<PgPool>,
}

impl PostgresClientStorage {
    /// Create a new client storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Find a client by its client_id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, client_id: &str) -> StorageResult<Option<Client>> {
        let row: Option<ClientTuple> = query_as(
            r#"
            SELECT client_id, tenant_id, secret_hash, allowed_redirect_uris, is_active
            FROM oauth_client
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(client_from_tuple))
    }

    /// Inserts or replaces a registration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the registration fails validation, or a
    /// database error.
    pub async fn upsert(&self, client: &Client) -> StorageResult<()> {
        client
            .validate()
            .map_err(|e| StorageError::invalid_input(e.to_string()))?;

        query(
            r#"
            INSERT INTO oauth_client
                (client_id, tenant_id, secret_hash, allowed_redirect_uris, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (client_id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                secret_hash = EXCLUDED.secret_hash,
                allowed_redirect_uris = EXCLUDED.allowed_redirect_uris,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.tenant_id)
        .bind(&client.secret_hash)
        .bind(&client.allowed_redirect_uris)
        .bind(client.is_active)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ClientStorage for PostgresClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        self.find(client_id).await.map_err(AuthError::from)
    }
}
