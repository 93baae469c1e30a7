//! OAuth 2.0 client domain types.
//!
//! Clients are owned by the external tenant/client registry. This server only
//! reads them; nothing here mutates a registration.

use serde::{Deserialize, Serialize};

use crate::oauth::client_auth::verify_client_secret;
use crate::oauth::redirect::{RedirectPattern, RedirectPatternError};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types accepted at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow with PKCE.
    AuthorizationCode,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Parses a `grant_type` parameter value.
    ///
    /// Returns `None` for any grant this server does not implement.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered relying client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Owning tenant (organization) of the client.
    pub tenant_id: String,

    /// Hash of the client secret. `None` marks a public client.
    ///
    /// Either a lowercase SHA-256 hex digest or an Argon2 PHC string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,

    /// Redirect URI patterns. Each entry is an exact URI or contains `*` wildcards.
    pub allowed_redirect_uris: Vec<String>,

    /// Inactive clients are rejected at both endpoints.
    pub is_active: bool,
}

impl Client {
    /// Returns `true` if the client holds a secret and must authenticate with it.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    /// Checks if `uri` is allowed by any registered redirect pattern.
    ///
    /// Unparseable patterns never match.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.allowed_redirect_uris.iter().any(|raw| {
            RedirectPattern::parse(raw)
                .map(|pattern| pattern.matches(uri))
                .unwrap_or(false)
        })
    }

    /// Verifies a supplied client secret.
    ///
    /// Public clients always pass. Confidential clients pass only when a secret
    /// is supplied and matches the stored hash.
    #[must_use]
    pub fn verify_secret(&self, supplied: Option<&str>) -> bool {
        match (&self.secret_hash, supplied) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(hash), Some(secret)) => verify_client_secret(hash, secret),
        }
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if identifiers are empty, no redirect URI is registered,
    /// or a redirect pattern is malformed.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.tenant_id.is_empty() {
            return Err(ClientValidationError::EmptyTenantId);
        }

        if self.allowed_redirect_uris.is_empty() {
            return Err(ClientValidationError::NoRedirectUris);
        }

        for raw in &self.allowed_redirect_uris {
            RedirectPattern::parse(raw)?;
        }

        Ok(())
    }
}

/// Client validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// Tenant ID cannot be empty.
    #[error("Tenant ID cannot be empty")]
    EmptyTenantId,

    /// Authorization code flow requires redirect URIs.
    #[error("At least one redirect URI is required")]
    NoRedirectUris,

    /// A redirect pattern is malformed.
    #[error(transparent)]
    InvalidRedirectPattern(#[from] RedirectPatternError),
}
