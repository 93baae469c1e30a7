//! Token endpoint types.
//!
//! The token endpoint accepts form-encoded, JSON, or raw urlencoded bodies.
//! Whatever the content type, the body is first parsed into [`RawTokenParams`]
//! and then normalized by [`TokenRequest::from_params`] into one typed request,
//! so the grant logic never sees the wire format.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange an authorization code for tokens (PKCE required)
//! - `refresh_token` - Rotate a refresh token and mint a new access token

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::client_auth::ClientCredentials;
use crate::types::GrantType;

/// Token request body before validation. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawTokenParams {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl RawTokenParams {
    /// Parses an `application/x-www-form-urlencoded` body.
    ///
    /// Unknown keys are ignored. For repeated keys the first occurrence wins.
    #[must_use]
    pub fn from_form(body: &[u8]) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            let slot = match key.as_ref() {
                "grant_type" => &mut params.grant_type,
                "code" => &mut params.code,
                "redirect_uri" => &mut params.redirect_uri,
                "code_verifier" => &mut params.code_verifier,
                "refresh_token" => &mut params.refresh_token,
                "scope" => &mut params.scope,
                "client_id" => &mut params.client_id,
                "client_secret" => &mut params.client_secret,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Parses an `application/json` body.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the body is not a JSON object
    /// with string values.
    pub fn from_json(body: &[u8]) -> AuthResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| AuthError::invalid_request(format!("Malformed JSON body: {}", e)))
    }
}

/// Grant-specific parameters of a normalized token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    /// `grant_type=authorization_code`
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: String,
    },

    /// `grant_type=refresh_token`
    RefreshToken {
        refresh_token: String,
        /// Requested narrowing. `None` keeps the original grant.
        scope: Option<String>,
    },
}

impl TokenGrant {
    /// The grant type this request uses.
    #[must_use]
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }
}

/// Normalized token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// The grant and its parameters.
    pub grant: TokenGrant,

    /// Client credentials from the body and Basic header.
    pub credentials: ClientCredentials,
}

fn require(value: Option<String>, name: &str) -> AuthResult<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        AuthError::invalid_request(format!("Missing required parameter: {}", name))
    })
}

impl TokenRequest {
    /// Validates raw parameters into a typed request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `grant_type`, `client_id`, or a grant-specific
    ///   parameter is missing
    /// - `UnsupportedGrantType` for any grant other than `authorization_code`
    ///   and `refresh_token`
    pub fn from_params(
        params: RawTokenParams,
        basic_auth: Option<(String, String)>,
    ) -> AuthResult<Self> {
        let grant_type = require(params.grant_type, "grant_type")?;
        let grant_type = GrantType::parse(&grant_type)
            .ok_or_else(|| AuthError::unsupported_grant_type(grant_type))?;

        let grant = match grant_type {
            GrantType::AuthorizationCode => TokenGrant::AuthorizationCode {
                code: require(params.code, "code")?,
                redirect_uri: require(params.redirect_uri, "redirect_uri")?,
                code_verifier: require(params.code_verifier, "code_verifier")?,
            },
            GrantType::RefreshToken => TokenGrant::RefreshToken {
                refresh_token: require(params.refresh_token, "refresh_token")?,
                scope: params.scope.filter(|s| !s.trim().is_empty()),
            },
        };

        let credentials =
            ClientCredentials::resolve(params.client_id, params.client_secret, basic_auth);
        credentials.require_client_id()?;

        Ok(Self { grant, credentials })
    }

    /// The client identifier. Always present after [`Self::from_params`].
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.credentials.client_id.as_deref().unwrap_or_default()
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "refresh_token": "abc123...",
///   "scope": "orders:read"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes (space-separated). Omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Creates a new token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: None,
            scope: (!scope.is_empty()).then_some(scope),
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Token error response.
///
/// # Example Response
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "Authorization code expired"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.error.http_status()
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::InvalidRequest { .. } => TokenErrorCode::InvalidRequest,
            AuthError::InvalidClient { .. } => TokenErrorCode::InvalidClient,
            AuthError::InvalidScope { .. } => TokenErrorCode::InvalidScope,
            AuthError::UnsupportedGrantType { .. } => TokenErrorCode::UnsupportedGrantType,
            AuthError::InvalidGrant { .. } | AuthError::PkceVerificationFailed => {
                TokenErrorCode::InvalidGrant
            }
            AuthError::AccessDenied { .. } | AuthError::UnsupportedResponseType { .. } => {
                TokenErrorCode::InvalidRequest
            }
            AuthError::Storage { .. }
            | AuthError::Timeout { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => TokenErrorCode::ServerError,
        };
        Self::with_description(code, err.description())
    }
}

/// OAuth 2.0 token error codes (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// The request is missing a required parameter or is otherwise malformed.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The authorization code or refresh token is invalid, expired, revoked,
    /// replayed, or was issued to another client.
    InvalidGrant,

    /// The grant type is not supported by the authorization server.
    UnsupportedGrantType,

    /// The requested scope exceeds the scope originally granted.
    InvalidScope,

    /// The authorization server failed to complete the request.
    ServerError,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
