//! Authorization endpoint types.
//!
//! This module provides the request, response and error types for the
//! front-channel half of the flow:
//!
//! 1. The client redirects the user-agent to `GET /authorize`
//! 2. The request is validated and an unclaimed code is issued
//! 3. The user-agent is sent to the login surface with the code as `auth_code`
//! 4. The login surface posts a [`CompletionRequest`] back once the user decided
//! 5. The caller receives the final redirect carrying `code` and `state`
//!
//! # Security Requirements
//!
//! - PKCE is required (`code_challenge` and `code_challenge_method`)
//! - Only S256 is supported
//! - Until the client and redirect URI are verified, errors are returned
//!   directly and never redirected

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod};

/// Maximum accepted length of the `state` parameter, in characters.
pub const MAX_STATE_LENGTH: usize = 512;

/// Maximum accepted length of the `scope` parameter, in characters.
pub const MAX_SCOPE_LENGTH: usize = 1024;

/// Authorization request parameters, as received on the query string.
///
/// Every field is optional at this layer so that a missing parameter is
/// reported as `invalid_request` rather than rejected by the extractor.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=cli_1
///   &redirect_uri=https://app.example.com/callback
///   &scope=orders:read orders:write
///   &state=abc123xyz
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier issued by the registry.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Where the final response is sent. Must match a registered pattern.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque client state, echoed back unchanged.
    #[serde(default)]
    pub state: Option<String>,

    /// PKCE code challenge: base64url(SHA-256(code_verifier)).
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE code challenge method. Must be "S256".
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// An authorization request that passed parameter validation.
///
/// The client and redirect URI have not been checked against the registry yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: PkceChallenge,
    pub code_challenge_method: PkceChallengeMethod,
}

fn require<'a>(value: &'a Option<String>, name: &str) -> AuthResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::invalid_request(format!(
            "Missing required parameter: {}",
            name
        ))),
    }
}

impl AuthorizationRequest {
    /// Validates parameters without touching storage.
    ///
    /// # Errors
    ///
    /// - `UnsupportedResponseType` if `response_type` is present but not `code`
    /// - `InvalidRequest` for a missing parameter, an oversized `state` or
    ///   `scope`, a malformed challenge, a non-S256 method, or a redirect URI
    ///   carrying a fragment
    pub fn validate(&self) -> AuthResult<ValidatedAuthorizationRequest> {
        let response_type = require(&self.response_type, "response_type")?;
        if response_type != "code" {
            return Err(AuthError::unsupported_response_type(response_type));
        }

        let client_id = require(&self.client_id, "client_id")?;
        let redirect_uri = require(&self.redirect_uri, "redirect_uri")?;
        let state = require(&self.state, "state")?;
        let code_challenge = require(&self.code_challenge, "code_challenge")?;
        let method = require(&self.code_challenge_method, "code_challenge_method")?;

        if state.chars().count() > MAX_STATE_LENGTH {
            return Err(AuthError::invalid_request(format!(
                "state must not exceed {} characters",
                MAX_STATE_LENGTH
            )));
        }

        let scope = self.scope.as_deref().unwrap_or_default();
        if scope.chars().count() > MAX_SCOPE_LENGTH {
            return Err(AuthError::invalid_request(format!(
                "scope must not exceed {} characters",
                MAX_SCOPE_LENGTH
            )));
        }

        let code_challenge = PkceChallenge::new(code_challenge.to_string())
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;
        let code_challenge_method = PkceChallengeMethod::parse(method)
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;

        if redirect_uri.contains('#') {
            return Err(AuthError::invalid_request(
                "redirect_uri must not contain a fragment",
            ));
        }

        Ok(ValidatedAuthorizationRequest {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            state: state.to_string(),
            code_challenge,
            code_challenge_method,
        })
    }
}

/// Builds the login-surface URL for an issued code.
///
/// Appends `auth_code`, `client_id`, `redirect_uri`, `state` and `scope` to
/// `login_url`, keeping any query it already has.
///
/// # Errors
///
/// Returns an error if `login_url` is not an absolute URL.
pub fn login_redirect_url(
    login_url: &str,
    auth_code: &str,
    request: &ValidatedAuthorizationRequest,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(login_url)?;
    url.query_pairs_mut()
        .append_pair("auth_code", auth_code)
        .append_pair("client_id", &request.client_id)
        .append_pair("redirect_uri", &request.redirect_uri)
        .append_pair("state", &request.state)
        .append_pair("scope", &request.scope);
    Ok(url.to_string())
}

/// Why an authorization request did not reach the login surface.
#[derive(Debug)]
pub enum AuthorizeRejection {
    /// The redirect target is not trusted yet; answer the user-agent directly.
    Direct(AuthError),

    /// The client and redirect URI were verified; report the error there.
    Redirect(AuthorizationError, String),
}

impl AuthorizeRejection {
    /// The underlying error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Direct(err) => err.oauth_error_code(),
            Self::Redirect(err, _) => err.error.as_str(),
        }
    }
}

/// Authorization response parameters, sent to the client's redirect URI.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 302 Found
/// Location: https://app.example.com/callback?
///   code=SplxlOBeZQQYbYS6WxSbIA
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    /// Authorization code to be exchanged for tokens.
    pub code: String,

    /// Echoed state parameter.
    pub state: String,
}

impl AuthorizationResponse {
    /// Creates a new authorization response.
    #[must_use]
    pub fn new(code: String, state: String) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an absolute URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        url.query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &self.state);
        Ok(url.to_string())
    }
}

/// Authorization error delivered by redirect.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 302 Found
/// Location: https://app.example.com/callback?
///   error=access_denied
///   &error_description=The+resource+owner+denied+the+request
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: AuthorizationErrorCode,

    /// Human-readable error description (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state parameter.
    pub state: String,
}

impl AuthorizationError {
    /// Creates a new authorization error with description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: String,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Converts an [`AuthError`] raised after redirect safety was established.
    #[must_use]
    pub fn from_auth_error(err: &AuthError, state: String) -> Self {
        Self::with_description(AuthorizationErrorCode::from(err), err.description(), state)
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an absolute URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            pairs.append_pair("state", &self.state);
        }
        Ok(url.to_string())
    }
}

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    /// The request is missing a required parameter or is otherwise malformed.
    InvalidRequest,

    /// The resource owner or authorization server denied the request.
    AccessDenied,

    /// The authorization server does not support this response type.
    UnsupportedResponseType,

    /// The requested scope is invalid, unknown, or malformed.
    InvalidScope,

    /// The authorization server encountered an unexpected condition.
    ServerError,
}

impl AuthorizationErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }
}

impl From<&AuthError> for AuthorizationErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::AccessDenied { .. } => Self::AccessDenied,
            AuthError::InvalidScope { .. } => Self::InvalidScope,
            AuthError::UnsupportedResponseType { .. } => Self::UnsupportedResponseType,
            e if e.is_server_error() => Self::ServerError,
            _ => Self::InvalidRequest,
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Callback from the login surface once the user approved or denied.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    /// The code handed to the login surface as `auth_code`.
    pub auth_code: String,

    /// Authenticated user. May be omitted on denial.
    #[serde(default)]
    pub user_id: String,

    /// Tenant the user acted in. May be omitted on denial.
    #[serde(default)]
    pub tenant_id: String,

    /// Whether the user granted the request.
    pub approved: bool,
}

/// Final redirect for the login surface to perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Client redirect URI with `code`/`state` or `error`/`state` appended.
    pub redirect_uri: String,
}
