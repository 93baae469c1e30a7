//! Authorization server configuration.
//!
//! Lifetimes and timeouts are written in humantime format (`"10m"`, `"30d"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//! login_url = "https://app.example.com/connector/login"
//! callback_secret = "shared-with-the-login-surface"
//!
//! [auth.oauth]
//! authorization_code_lifetime = "10m"
//! access_token_lifetime = "1h"
//! refresh_token_lifetime = "30d"
//! operation_timeout = "5s"
//!
//! [auth.signing]
//! algorithm = "HS256"
//! secret = "change-me-to-at-least-32-bytes-of-entropy"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::oauth::AuthorizationConfig;
use crate::token::TokenConfig;

/// Minimum length of an HMAC signing secret in bytes.
pub const MIN_HMAC_SECRET_LEN: usize = 32;

/// Root authorization server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL, used as the `iss` claim and in server metadata.
    pub issuer: String,

    /// External login/consent surface. The authorize endpoint redirects here with
    /// `auth_code`, `client_id`, `redirect_uri`, `state` and `scope` appended.
    pub login_url: String,

    /// Shared secret the login surface presents as `Authorization: Bearer <secret>`
    /// on `POST /authorize`. When unset the callback is unauthenticated and must
    /// only be reachable from the login surface's network.
    pub callback_secret: Option<String>,

    /// OAuth 2.0 lifetimes and timeouts.
    pub oauth: OAuthConfig,

    /// Access token signing configuration.
    pub signing: SigningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            login_url: "http://localhost:8080/login".to_string(),
            callback_secret: None,
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// OAuth 2.0 lifetimes and timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime. Fixed at creation, never extended.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Deadline for all external calls (storage, signing) made while serving one request.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Access token signing configuration.
///
/// HS256 requires `secret`. RS256/RS384/ES384 use `private_key_pem` and
/// `public_key_pem`; when both are absent an ephemeral key pair is generated
/// at startup, which only suits development.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm: "HS256", "RS256", "RS384" or "ES384".
    pub algorithm: String,

    /// Key ID placed in the JWT header.
    pub kid: Option<String>,

    /// Shared secret for HS256.
    pub secret: Option<String>,

    /// PEM-encoded private key for asymmetric algorithms.
    pub private_key_pem: Option<String>,

    /// PEM-encoded public key for asymmetric algorithms.
    pub public_key_pem: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            kid: None,
            secret: None,
            private_key_pem: None,
            public_key_pem: None,
        }
    }
}

impl SigningConfig {
    /// Returns `true` if the configuration names an asymmetric key pair explicitly.
    #[must_use]
    pub fn has_key_pair(&self) -> bool {
        self.private_key_pem.is_some() && self.public_key_pem.is_some()
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The issuer or login URL is empty
    /// - A lifetime or the operation timeout is zero
    /// - The signing algorithm is not supported
    /// - HS256 is selected without a sufficiently long secret
    /// - Only one half of an asymmetric key pair is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }
        if self.login_url.is_empty() {
            return Err(ConfigError::Missing("login_url".to_string()));
        }

        let lifetimes = [
            ("authorization_code_lifetime", self.oauth.authorization_code_lifetime),
            ("access_token_lifetime", self.oauth.access_token_lifetime),
            ("refresh_token_lifetime", self.oauth.refresh_token_lifetime),
            ("operation_timeout", self.oauth.operation_timeout),
        ];
        for (name, value) in lifetimes {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{} must be > 0", name)));
            }
        }

        match self.signing.algorithm.as_str() {
            "HS256" => {
                let secret = self
                    .signing
                    .secret
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing("signing.secret".to_string()))?;
                if secret.len() < MIN_HMAC_SECRET_LEN {
                    return Err(ConfigError::InvalidValue(format!(
                        "signing.secret must be at least {} bytes",
                        MIN_HMAC_SECRET_LEN
                    )));
                }
            }
            "RS256" | "RS384" | "ES384" => {
                if self.signing.private_key_pem.is_some() != self.signing.public_key_pem.is_some()
                {
                    return Err(ConfigError::InvalidValue(
                        "signing.private_key_pem and signing.public_key_pem must be set together"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, RS256, RS384, or ES384",
                    other
                )));
            }
        }

        Ok(())
    }

    /// Builds the authorize-flow configuration.
    #[must_use]
    pub fn authorization_config(&self) -> AuthorizationConfig {
        AuthorizationConfig::new(self.login_url.clone())
            .with_code_lifetime(self.oauth.authorization_code_lifetime)
            .with_operation_timeout(self.oauth.operation_timeout)
            .with_callback_secret(self.callback_secret.clone())
    }

    /// Builds the token-endpoint configuration.
    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.issuer.clone(),
            access_token_lifetime: self.oauth.access_token_lifetime,
            refresh_token_lifetime: self.oauth.refresh_token_lifetime,
            operation_timeout: self.oauth.operation_timeout,
        }
    }
}
