//! OAuth authorization service.
//!
//! Drives the front-channel half of the flow: validating an authorization
//! request, issuing an unclaimed code, and completing it once the login
//! surface reports the user's decision.
//!
//! # Security Requirements
//!
//! - PKCE is required for all clients (S256 method only)
//! - Authorization codes are 256-bit random values
//! - Codes expire after a configurable time (default 10 minutes)
//! - Errors are only redirected after the client and redirect URI are verified
//!
//! # Usage
//!
//! ```ignore
//! use connector_auth::oauth::{AuthorizationService, AuthorizationConfig};
//!
//! let service = AuthorizationService::new(
//!     client_storage,
//!     code_storage,
//!     AuthorizationConfig::new("https://app.example.com/connector/login"),
//! );
//!
//! let login_url = service.authorize(&request).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::AuthResult;
use crate::deadline::RequestDeadline;
use crate::error::AuthError;
use crate::oauth::authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
    AuthorizeRejection, CompletionRequest, CompletionResponse, ValidatedAuthorizationRequest,
    login_redirect_url,
};
use crate::storage::{AuthorizationCodeStorage, ClientStorage};
use crate::types::{AuthorizationCode, Client};

/// Configuration for the authorization service.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// External login/consent surface.
    pub login_url: String,

    /// Authorization code lifetime.
    /// Default: 10 minutes.
    pub code_lifetime: Duration,

    /// Budget for all storage calls made while serving one request.
    /// Default: 5 seconds.
    pub operation_timeout: Duration,

    /// Bearer secret required on completion callbacks. `None` disables the check.
    pub callback_secret: Option<String>,
}

impl AuthorizationConfig {
    /// Creates a configuration with default lifetimes.
    #[must_use]
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            code_lifetime: Duration::from_secs(600),
            operation_timeout: Duration::from_secs(5),
            callback_secret: None,
        }
    }

    /// Sets the authorization code lifetime.
    #[must_use]
    pub fn with_code_lifetime(mut self, lifetime: Duration) -> Self {
        self.code_lifetime = lifetime;
        self
    }

    /// Sets the per-request storage budget.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the secret the login surface must present when completing a code.
    #[must_use]
    pub fn with_callback_secret(mut self, secret: Option<String>) -> Self {
        self.callback_secret = secret.filter(|s| !s.is_empty());
        self
    }
}

/// Authorization service for the `/authorize` endpoint.
pub struct AuthorizationService {
    client_storage: Arc<dyn ClientStorage>,
    code_storage: Arc<dyn AuthorizationCodeStorage>,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    #[must_use]
    pub fn new(
        client_storage: Arc<dyn ClientStorage>,
        code_storage: Arc<dyn AuthorizationCodeStorage>,
        config: AuthorizationConfig,
    ) -> Self {
        Self {
            client_storage,
            code_storage,
            config,
        }
    }

    /// Whether completion callbacks must carry the shared secret.
    #[must_use]
    pub fn requires_callback_secret(&self) -> bool {
        self.config.callback_secret.is_some()
    }

    /// Checks the bearer secret presented on a completion callback.
    ///
    /// # Errors
    ///
    /// `InvalidClient` when a secret is configured and `presented` is missing
    /// or different.
    pub fn verify_callback_secret(&self, presented: Option<&str>) -> AuthResult<()> {
        let Some(expected) = self.config.callback_secret.as_deref() else {
            return Ok(());
        };
        let matches: bool = presented
            .map(|p| p.as_bytes().ct_eq(expected.as_bytes()).into())
            .unwrap_or(false);
        if matches {
            Ok(())
        } else {
            Err(AuthError::invalid_client(
                "Completion callback is not authenticated",
            ))
        }
    }

    /// Processes an authorization request.
    ///
    /// # Returns
    ///
    /// The login-surface URL the user-agent is sent to, carrying the new code
    /// as `auth_code`.
    ///
    /// # Errors
    ///
    /// - [`AuthorizeRejection::Direct`] for parameter errors, an unknown or
    ///   inactive client (`invalid_client`), an unregistered redirect URI, or a
    ///   failure while looking the client up
    /// - [`AuthorizeRejection::Redirect`] for failures after the redirect URI
    ///   was verified, such as storage errors while issuing the code
    ///
    /// # Security
    ///
    /// - Never log the authorization code or state parameter
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<String, AuthorizeRejection> {
        let deadline = RequestDeadline::start(self.config.operation_timeout);

        // 1. Parameters
        let request = request.validate().map_err(AuthorizeRejection::Direct)?;

        // 2. Client and redirect URI. Nothing may be redirected before both pass.
        let client = self
            .verify_client_and_redirect(&request, &deadline)
            .await
            .map_err(AuthorizeRejection::Direct)?;

        // 3. Issue the code
        let redirect_error = |err: AuthError| {
            AuthorizeRejection::Redirect(
                AuthorizationError::from_auth_error(&err, request.state.clone()),
                request.redirect_uri.clone(),
            )
        };

        let code = self
            .issue_code(&request, client.tenant_id, &deadline)
            .await
            .map_err(redirect_error)?;

        login_redirect_url(&self.config.login_url, &code, &request).map_err(|e| {
            warn!(error = %e, "Configured login_url is not an absolute URL");
            redirect_error(AuthError::configuration(format!("Invalid login_url: {}", e)))
        })
    }

    async fn verify_client_and_redirect(
        &self,
        request: &ValidatedAuthorizationRequest,
        deadline: &RequestDeadline,
    ) -> AuthResult<Client> {
        let client = deadline
            .run(
                "find_client",
                self.client_storage.find_by_client_id(&request.client_id),
            )
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        if !client.is_active {
            return Err(AuthError::invalid_client("Client is inactive"));
        }

        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            debug!(client_id = %request.client_id, "Unregistered redirect_uri");
            return Err(AuthError::invalid_request("redirect_uri is not registered"));
        }

        Ok(client)
    }

    async fn issue_code(
        &self,
        request: &ValidatedAuthorizationRequest,
        tenant_id: String,
        deadline: &RequestDeadline,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let record = AuthorizationCode {
            code: AuthorizationCode::generate_code(),
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            state: request.state.clone(),
            code_challenge: request.code_challenge.as_str().to_string(),
            code_challenge_method: request.code_challenge_method.as_str().to_string(),
            tenant_id,
            user_id: None,
            created_at: now,
            expires_at: now + self.config.code_lifetime,
            used_at: None,
            denied_at: None,
        };

        deadline
            .run("create_authorization_code", self.code_storage.create(&record))
            .await?;

        info!(client_id = %record.client_id, "Authorization code issued");
        Ok(record.code)
    }

    /// Completes an authorization request with the login surface's result.
    ///
    /// A denial marks the code denied, which is final, and produces an
    /// `access_denied` redirect. An approval claims the code for the user and
    /// tenant; the code is only redeemed later at the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the code is unknown, already claimed, denied,
    /// used, or expired, or if an approval omits `user_id`/`tenant_id`. Storage
    /// failures and timeouts surface as server errors.
    pub async fn complete(&self, request: &CompletionRequest) -> AuthResult<CompletionResponse> {
        let deadline = RequestDeadline::start(self.config.operation_timeout);
        let now = OffsetDateTime::now_utc();

        let code = deadline
            .run(
                "find_authorization_code",
                self.code_storage.find_by_code(&request.auth_code),
            )
            .await?
            .ok_or_else(|| AuthError::invalid_request("Unknown authorization code"))?;

        if code.is_used() {
            return Err(AuthError::invalid_request(
                "Authorization code has already been used",
            ));
        }
        if code.is_expired_at(now) {
            return Err(AuthError::invalid_request("Authorization code has expired"));
        }
        if code.is_denied() {
            return Err(AuthError::invalid_request(
                "Authorization request was denied",
            ));
        }
        if code.is_claimed() {
            return Err(AuthError::invalid_request(
                "Authorization code has already been completed",
            ));
        }

        if !request.approved {
            let denied = deadline
                .run(
                    "deny_authorization_code",
                    self.code_storage.deny(&code.code, now),
                )
                .await?;
            if !denied {
                return Err(AuthError::invalid_request(
                    "Authorization code is no longer pending",
                ));
            }
            info!(client_id = %code.client_id, "Authorization denied by user");
            let error = AuthorizationError::with_description(
                AuthorizationErrorCode::AccessDenied,
                "The resource owner denied the request",
                code.state.clone(),
            );
            return redirect_to(error.to_redirect_url(&code.redirect_uri));
        }

        if request.user_id.is_empty() || request.tenant_id.is_empty() {
            return Err(AuthError::invalid_request(
                "user_id and tenant_id are required to approve",
            ));
        }

        let claimed = deadline
            .run(
                "claim_authorization_code",
                self.code_storage
                    .claim(&code.code, &request.user_id, &request.tenant_id, now),
            )
            .await?;
        if !claimed {
            return Err(AuthError::invalid_request(
                "Authorization code is no longer pending",
            ));
        }

        info!(
            client_id = %code.client_id,
            user_id = %request.user_id,
            tenant_id = %request.tenant_id,
            "Authorization approved"
        );

        let response = AuthorizationResponse::new(code.code, code.state);
        redirect_to(response.to_redirect_url(&code.redirect_uri))
    }
}

fn redirect_to(url: Result<String, url::ParseError>) -> AuthResult<CompletionResponse> {
    url.map(|redirect_uri| CompletionResponse { redirect_uri })
        .map_err(|e| AuthError::internal(format!("Stored redirect_uri is invalid: {}", e)))
}
