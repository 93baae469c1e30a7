//! Storage tests against a live PostgreSQL.
//!
//! Skipped unless `CONNECTOR_AUTH_TEST_DATABASE_URL` is set.

use std::sync::Arc;

use connector_auth::storage::{AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage};
use connector_auth::types::{AuthorizationCode, Client, RefreshToken};
use connector_auth_postgres::{PostgresAuthStorage, PostgresConfig};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn storage() -> Option<PostgresAuthStorage> {
    let url = std::env::var("CONNECTOR_AUTH_TEST_DATABASE_URL").ok()?;
    let storage = PostgresAuthStorage::connect(&PostgresConfig::new(url).with_pool_size(4))
        .await
        .expect("connect to test database");
    storage.migrate().await.expect("run migrations");
    Some(storage)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn code(value: &str) -> AuthorizationCode {
    let now = OffsetDateTime::now_utc();
    AuthorizationCode {
        code: value.to_string(),
        client_id: "cli_1".to_string(),
        redirect_uri: "https://app.example.com/callback".to_string(),
        scope: "orders:read".to_string(),
        state: "xyz".to_string(),
        code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
        code_challenge_method: "S256".to_string(),
        tenant_id: "t0".to_string(),
        user_id: None,
        created_at: now,
        expires_at: now + Duration::minutes(10),
        used_at: None,
        denied_at: None,
    }
}

fn refresh(hash: &str, origin: &str) -> RefreshToken {
    let now = OffsetDateTime::now_utc();
    RefreshToken {
        id: Uuid::new_v4(),
        token_hash: hash.to_string(),
        client_id: "cli_1".to_string(),
        user_id: "u1".to_string(),
        tenant_id: "t1".to_string(),
        scope: "a b".to_string(),
        originating_authorization_code: origin.to_string(),
        created_at: now,
        expires_at: now + Duration::days(30),
        revoked_at: None,
    }
}

#[tokio::test]
async fn client_upsert_and_lookup() {
    let Some(storage) = storage().await else {
        return;
    };
    let clients = storage.clients();
    let client = Client {
        client_id: unique("cli"),
        tenant_id: "t0".to_string(),
        secret_hash: None,
        allowed_redirect_uris: vec!["https://*.example.com/cb".to_string()],
        is_active: true,
    };

    clients.upsert(&client).await.unwrap();
    let found = clients.find_by_client_id(&client.client_id).await.unwrap().unwrap();
    assert_eq!(found.allowed_redirect_uris, client.allowed_redirect_uris);
    assert!(found.secret_hash.is_none());
    assert!(clients.find_by_client_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn code_claim_and_redeem_are_single_shot() {
    let Some(storage) = storage().await else {
        return;
    };
    let codes = Arc::new(storage.authorization_codes());
    let value = unique("code");
    codes.create(&code(&value)).await.unwrap();
    assert!(codes.create(&code(&value)).await.is_err());

    let now = OffsetDateTime::now_utc();
    assert!(codes.claim(&value, "u1", "t1", now).await.unwrap());
    assert!(!codes.claim(&value, "u2", "t2", now).await.unwrap());

    let (a, b) = tokio::join!(codes.mark_used(&value, now), codes.mark_used(&value, now));
    assert!(a.unwrap() ^ b.unwrap());

    let stored = codes.find_by_code(&value).await.unwrap().unwrap();
    assert_eq!(stored.user_id.as_deref(), Some("u1"));
    assert_eq!(stored.tenant_id, "t1");
    assert!(stored.used_at.is_some());
}

#[tokio::test]
async fn denied_code_is_final() {
    let Some(storage) = storage().await else {
        return;
    };
    let codes = storage.authorization_codes();
    let value = unique("code");
    codes.create(&code(&value)).await.unwrap();

    let now = OffsetDateTime::now_utc();
    assert!(codes.deny(&value, now).await.unwrap());
    assert!(!codes.deny(&value, now).await.unwrap());
    assert!(!codes.claim(&value, "u1", "t1", now).await.unwrap());

    let stored = codes.find_by_code(&value).await.unwrap().unwrap();
    assert!(stored.denied_at.is_some());
    assert!(stored.user_id.is_none());
}

#[tokio::test]
async fn rotation_is_atomic_and_single_winner() {
    let Some(storage) = storage().await else {
        return;
    };
    let tokens = storage.refresh_tokens();
    let origin = unique("code");
    let current = refresh(&unique("h"), &origin);
    tokens.create(&current).await.unwrap();

    let now = OffsetDateTime::now_utc();
    let first = refresh(&unique("h"), &origin);
    let second = refresh(&unique("h"), &origin);
    let (a, b) = tokio::join!(
        tokens.rotate(&current.token_hash, &first, now),
        tokens.rotate(&current.token_hash, &second, now)
    );
    assert!(a.unwrap() ^ b.unwrap());

    // Exactly one successor was written
    let first_found = tokens.find_by_hash(&first.token_hash).await.unwrap().is_some();
    let second_found = tokens.find_by_hash(&second.token_hash).await.unwrap().is_some();
    assert!(first_found ^ second_found);

    let revoked = tokens.revoke_by_authorization_code(&origin, now).await.unwrap();
    assert_eq!(revoked, 1);
    assert_eq!(tokens.revoke_by_authorization_code(&origin, now).await.unwrap(), 0);
}
