//! Token endpoint service.
//!
//! Handles the back-channel grant exchanges:
//! - `authorization_code`: redeems a claimed code for an access token and a
//!   refresh token, with PKCE verification
//! - `refresh_token`: rotates a refresh token and re-mints an access token,
//!   optionally with a narrower scope
//!
//! # Security
//!
//! - An authorization code is redeemed at most once. Any later attempt,
//!   including the loser of a concurrent race, revokes every refresh token
//!   descending from that code.
//! - Refresh tokens are stored hashed and rotated on every use.
//! - Scope can only shrink on refresh.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::AuthResult;
use crate::deadline::RequestDeadline;
use crate::error::AuthError;
use crate::oauth::client_auth::verify_client;
use crate::oauth::pkce;
use crate::oauth::token::{TokenGrant, TokenRequest, TokenResponse};
use crate::storage::{AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage};
use crate::token::jwt::{AccessTokenClaims, AccessTokenIssuer, SigningKeyPair};
use crate::types::{AuthorizationCode, Client, RefreshToken};

/// Token endpoint configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer URL placed in the `iss` claim.
    pub issuer: String,

    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,

    /// Budget for all storage and signing calls made while serving one request.
    pub operation_timeout: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            access_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

impl TokenConfig {
    /// Builds the access token issuer for this configuration.
    #[must_use]
    pub fn build_issuer(&self, signing_key: SigningKeyPair) -> AccessTokenIssuer {
        AccessTokenIssuer::new(signing_key, self.issuer.clone(), self.access_token_lifetime)
    }
}

/// Service for the `/token` endpoint.
pub struct TokenService {
    client_storage: Arc<dyn ClientStorage>,
    code_storage: Arc<dyn AuthorizationCodeStorage>,
    refresh_storage: Arc<dyn RefreshTokenStorage>,
    issuer: Arc<AccessTokenIssuer>,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        client_storage: Arc<dyn ClientStorage>,
        code_storage: Arc<dyn AuthorizationCodeStorage>,
        refresh_storage: Arc<dyn RefreshTokenStorage>,
        issuer: Arc<AccessTokenIssuer>,
        config: TokenConfig,
    ) -> Self {
        Self {
            client_storage,
            code_storage,
            refresh_storage,
            issuer,
            config,
        }
    }

    /// Serves a normalized token request.
    ///
    /// # Errors
    ///
    /// Returns the OAuth error for the failed step; see [`Self::exchange_code`]
    /// and [`Self::refresh`].
    pub async fn handle(&self, request: &TokenRequest) -> AuthResult<TokenResponse> {
        let deadline = RequestDeadline::start(self.config.operation_timeout);
        let client = self.authenticate_client(request, &deadline).await?;

        match &request.grant {
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                self.exchange_code(&client, code, redirect_uri, code_verifier, &deadline)
                    .await
            }
            TokenGrant::RefreshToken {
                refresh_token,
                scope,
            } => {
                self.refresh(&client, refresh_token, scope.as_deref(), &deadline)
                    .await
            }
        }
    }

    async fn authenticate_client(
        &self,
        request: &TokenRequest,
        deadline: &RequestDeadline,
    ) -> AuthResult<Client> {
        let client_id = request.credentials.require_client_id()?;
        let client = deadline
            .run("find_client", self.client_storage.find_by_client_id(client_id))
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        // Argon2 verification is CPU bound, keep it off the async workers.
        let checked = client.clone();
        let credentials = request.credentials.clone();
        deadline
            .run_blocking("verify_client_secret", move || {
                verify_client(&checked, &credentials)
            })
            .await
            .inspect_err(|_| {
                debug!(client_id = %client_id, "Client authentication failed");
            })?;

        Ok(client)
    }

    /// Redeems an authorization code.
    ///
    /// # Errors
    ///
    /// - `InvalidGrant` if the code is unknown, replayed, expired, not yet
    ///   approved, bound to another client or redirect URI, or the PKCE
    ///   verifier does not match
    /// - `Storage`, `Timeout` or `Internal` for infrastructure failures
    pub async fn exchange_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        deadline: &RequestDeadline,
    ) -> AuthResult<TokenResponse> {
        let now = OffsetDateTime::now_utc();

        let record = deadline
            .run("find_authorization_code", self.code_storage.find_by_code(code))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        if record.is_used() {
            return Err(self.handle_replay(&record, now, deadline).await);
        }

        if record.is_denied() {
            return Err(AuthError::invalid_grant("Authorization request was denied"));
        }

        if record.is_expired_at(now) {
            return Err(AuthError::invalid_grant("Authorization code has expired"));
        }

        if record.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "Authorization code was issued to another client",
            ));
        }

        // Exact comparison; wildcard patterns only apply at /authorize
        if record.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_grant("redirect_uri mismatch"));
        }

        let Some(user_id) = record.user_id.clone() else {
            return Err(AuthError::invalid_grant(
                "Authorization code has not been approved",
            ));
        };

        if !pkce::verify(
            code_verifier,
            &record.code_challenge,
            Some(record.code_challenge_method.as_str()),
        ) {
            return Err(AuthError::invalid_grant("PKCE verification failed"));
        }

        let claims =
            self.issuer
                .claims_for(&user_id, &record.tenant_id, &client.client_id, &record.scope);
        let access_token = self.sign(claims, deadline).await?;

        // The refresh token is stored before the code is marked used. Any
        // request that observes `used_at` then also observes this token, so
        // replay revocation always reaches it.
        let raw_refresh = RefreshToken::generate_token();
        let refresh = RefreshToken {
            id: uuid::Uuid::new_v4(),
            token_hash: RefreshToken::hash_token(&raw_refresh),
            client_id: client.client_id.clone(),
            user_id: user_id.clone(),
            tenant_id: record.tenant_id.clone(),
            scope: record.scope.clone(),
            originating_authorization_code: record.code.clone(),
            created_at: now,
            expires_at: now + refresh_lifetime(self.config.refresh_token_lifetime),
            revoked_at: None,
        };
        deadline
            .run("create_refresh_token", self.refresh_storage.create(&refresh))
            .await?;

        let redeemed = deadline
            .run(
                "mark_authorization_code_used",
                self.code_storage.mark_used(&record.code, now),
            )
            .await?;
        if !redeemed {
            // Another request redeemed the code first; this revokes its
            // tokens and the one stored above.
            return Err(self.handle_replay(&record, now, deadline).await);
        }

        info!(
            client_id = %client.client_id,
            user_id = %user_id,
            tenant_id = %record.tenant_id,
            "Authorization code redeemed"
        );

        Ok(
            TokenResponse::new(access_token, self.issuer.lifetime_secs(), record.scope)
                .with_refresh_token(raw_refresh),
        )
    }

    /// Revokes every refresh token descending from a replayed code.
    ///
    /// Returns the error to send; revocation failures surface as server errors
    /// so a replay is never answered with a plain `invalid_grant` while its
    /// tokens stay live.
    async fn handle_replay(
        &self,
        record: &AuthorizationCode,
        now: OffsetDateTime,
        deadline: &RequestDeadline,
    ) -> AuthError {
        let revoked = deadline
            .run(
                "revoke_refresh_tokens_by_code",
                self.refresh_storage
                    .revoke_by_authorization_code(&record.code, now),
            )
            .await;

        match revoked {
            Ok(revoked) => {
                warn!(
                    security_event = "authorization_code_replay",
                    client_id = %record.client_id,
                    revoked,
                    "Authorization code replay detected, descendant refresh tokens revoked"
                );
                AuthError::invalid_grant("Authorization code has already been used")
            }
            Err(err) => {
                warn!(
                    security_event = "authorization_code_replay",
                    client_id = %record.client_id,
                    error = %err,
                    "Authorization code replay detected, revocation failed"
                );
                err
            }
        }
    }

    /// Rotates a refresh token and mints a new access token.
    ///
    /// # Errors
    ///
    /// - `InvalidGrant` if the token is unknown, revoked, expired, issued to
    ///   another client, or lost a concurrent rotation
    /// - `InvalidScope` if `requested_scope` is not a subset of the grant
    /// - `Storage`, `Timeout` or `Internal` for infrastructure failures
    pub async fn refresh(
        &self,
        client: &Client,
        refresh_token: &str,
        requested_scope: Option<&str>,
        deadline: &RequestDeadline,
    ) -> AuthResult<TokenResponse> {
        let now = OffsetDateTime::now_utc();
        let token_hash = RefreshToken::hash_token(refresh_token);

        let current = deadline
            .run(
                "find_refresh_token",
                self.refresh_storage.find_by_hash(&token_hash),
            )
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        if current.is_revoked() {
            debug!(client_id = %current.client_id, "Revoked refresh token presented");
            return Err(AuthError::invalid_grant("Refresh token has been revoked"));
        }
        if current.is_expired_at(now) {
            return Err(AuthError::invalid_grant("Refresh token has expired"));
        }

        if current.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to another client",
            ));
        }

        let scope = determine_refresh_scope(&current.scope, requested_scope)?;

        let claims = self.issuer.claims_for(
            &current.user_id,
            &current.tenant_id,
            &client.client_id,
            &scope,
        );
        let access_token = self.sign(claims, deadline).await?;

        let raw_refresh = RefreshToken::generate_token();
        let successor = current.successor(
            RefreshToken::hash_token(&raw_refresh),
            scope.clone(),
            now,
            refresh_lifetime(self.config.refresh_token_lifetime),
        );

        let rotated = deadline
            .run(
                "rotate_refresh_token",
                self.refresh_storage.rotate(&current.token_hash, &successor, now),
            )
            .await?;
        if !rotated {
            return Err(AuthError::invalid_grant(
                "Refresh token has already been used",
            ));
        }

        info!(
            client_id = %client.client_id,
            user_id = %current.user_id,
            "Refresh token rotated"
        );

        Ok(TokenResponse::new(access_token, self.issuer.lifetime_secs(), scope)
            .with_refresh_token(raw_refresh))
    }

    async fn sign(
        &self,
        claims: AccessTokenClaims,
        deadline: &RequestDeadline,
    ) -> AuthResult<String> {
        let issuer = Arc::clone(&self.issuer);
        deadline
            .run_blocking("sign_access_token", move || {
                issuer
                    .issue(&claims)
                    .map_err(|e| AuthError::internal(format!("Failed to sign access token: {}", e)))
            })
            .await
    }

    /// Returns the access token issuer.
    #[must_use]
    pub fn issuer(&self) -> &Arc<AccessTokenIssuer> {
        &self.issuer
    }
}

fn refresh_lifetime(lifetime: Duration) -> time::Duration {
    time::Duration::try_from(lifetime).unwrap_or(time::Duration::MAX)
}

/// Resolves the scope of a refreshed grant.
///
/// `None` keeps the original scope. A requested scope must be a subset of the
/// original grant and is returned in request order without duplicates.
///
/// # Errors
///
/// Returns `InvalidScope` if any requested scope is not in the original grant.
pub fn determine_refresh_scope(original: &str, requested: Option<&str>) -> AuthResult<String> {
    let Some(requested) = requested else {
        return Ok(original.to_string());
    };

    let granted: HashSet<&str> = original.split_whitespace().collect();
    if requested
        .split_whitespace()
        .any(|scope| !granted.contains(scope))
    {
        return Err(AuthError::invalid_scope(
            "Requested scope exceeds original grant",
        ));
    }

    let mut seen = HashSet::new();
    Ok(requested
        .split_whitespace()
        .filter(|scope| seen.insert(*scope))
        .collect::<Vec<_>>()
        .join(" "))
}
