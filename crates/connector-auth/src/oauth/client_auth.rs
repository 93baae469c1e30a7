//! Client authentication for the token endpoint.
//!
//! # Authentication Methods
//!
//! - `none` - Public clients (registered without a secret, authenticated by PKCE)
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in the request body
//!
//! # Credential Precedence
//!
//! Body fields win. The Basic header only fills in what the body left out: if the
//! body carries neither field the header supplies both, and if the body carries a
//! `client_id` without a secret the header secret is used only when the header
//! names the same client.

use std::fmt;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::Client;

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Every method this server accepts, as advertised in server metadata.
    pub const SUPPORTED: [Self; 3] = [Self::ClientSecretBasic, Self::ClientSecretPost, Self::None];

    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client credentials resolved from the request body and Basic header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client identifier, if any was presented.
    pub client_id: Option<String>,

    /// Client secret, if any was presented.
    pub client_secret: Option<String>,

    /// Where the secret came from.
    pub method: Option<TokenEndpointAuthMethod>,
}

impl ClientCredentials {
    /// Merges body credentials with an optional Basic header.
    #[must_use]
    pub fn resolve(
        body_client_id: Option<String>,
        body_client_secret: Option<String>,
        basic: Option<(String, String)>,
    ) -> Self {
        match (body_client_id, body_client_secret, basic) {
            (Some(id), Some(secret), _) => Self {
                client_id: Some(id),
                client_secret: Some(secret),
                method: Some(TokenEndpointAuthMethod::ClientSecretPost),
            },
            (Some(id), None, Some((basic_id, basic_secret))) if basic_id == id => Self {
                client_id: Some(id),
                client_secret: Some(basic_secret),
                method: Some(TokenEndpointAuthMethod::ClientSecretBasic),
            },
            (Some(id), None, _) => Self {
                client_id: Some(id),
                client_secret: None,
                method: Some(TokenEndpointAuthMethod::None),
            },
            (None, None, Some((basic_id, basic_secret))) => Self {
                client_id: Some(basic_id),
                client_secret: Some(basic_secret),
                method: Some(TokenEndpointAuthMethod::ClientSecretBasic),
            },
            // A secret without an identifier authenticates nobody
            (None, _, _) => Self::default(),
        }
    }

    /// Returns the client identifier or an `invalid_request` error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if no client_id was presented.
    pub fn require_client_id(&self) -> AuthResult<&str> {
        self.client_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("Missing required parameter: client_id"))
    }
}

/// Verifies presented credentials against a looked-up client.
///
/// # Errors
///
/// Returns `AuthError::InvalidClient` if the client is inactive or a
/// confidential client's secret is missing or wrong.
pub fn verify_client(client: &Client, credentials: &ClientCredentials) -> AuthResult<()> {
    if !client.is_active {
        return Err(AuthError::invalid_client("Client is inactive"));
    }

    if client.is_confidential() && credentials.client_secret.is_none() {
        return Err(AuthError::invalid_client("Client authentication required"));
    }

    if !client.verify_secret(credentials.client_secret.as_deref()) {
        return Err(AuthError::invalid_client("Client authentication failed"));
    }

    Ok(())
}

/// Hashes a client secret into the lowercase SHA-256 hex form stored by the registry.
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Checks `secret` against a stored hash.
///
/// The stored hash is either an Argon2 PHC string or a SHA-256 hex digest. Hex
/// digests are compared in constant time.
#[must_use]
pub fn verify_client_secret(stored_hash: &str, secret: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(secret.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false);
    }

    let supplied = hash_client_secret(secret);
    supplied
        .as_bytes()
        .ct_eq(stored_hash.to_ascii_lowercase().as_bytes())
        .into()
}

/// Parses an HTTP Basic Auth header.
///
/// Both halves are form-urlencoded before base64 encoding (RFC 6749 §2.3.1)
/// and are decoded after the split on the first colon.
///
/// # Returns
///
/// Returns `Some((client_id, client_secret))` if the header is valid,
/// `None` otherwise.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (client_id, client_secret) = credentials.split_once(':')?;
    let client_id = form_urldecode(client_id);
    if client_id.is_empty() {
        return None;
    }

    Some((client_id, form_urldecode(client_secret)))
}

fn form_urldecode(component: &str) -> String {
    // Escape `&` so the whole component decodes as a single value.
    let pair = format!("v={}", component.replace('&', "%26"));
    url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::PasswordHasher;
    use argon2::password_hash::SaltString;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn client(secret: Option<&str>) -> Client {
        Client {
            client_id: "cli_1".to_string(),
            tenant_id: "t1".to_string(),
            secret_hash: secret.map(hash_client_secret),
            allowed_redirect_uris: vec!["https://app.example.com/cb".to_string()],
            is_active: true,
        }
    }

    fn basic(id: &str, secret: &str) -> Option<(String, String)> {
        Some((id.to_string(), secret.to_string()))
    }

    #[test]
    fn test_hash_and_verify_sha256() {
        let hash = hash_client_secret("s3cret");
        assert_eq!(hash.len(), 64);
        assert!(verify_client_secret(&hash, "s3cret"));
        assert!(verify_client_secret(&hash.to_uppercase(), "s3cret"));
        assert!(!verify_client_secret(&hash, "s3cret "));
        assert!(!verify_client_secret("deadbeef", "s3cret"));
    }

    #[test]
    fn test_verify_argon2() {
        let salt = SaltString::from_b64("c29tZXNhbHRzb21lc2FsdA").unwrap();
        let hash = Argon2::default()
            .hash_password(b"s3cret", &salt)
            .unwrap()
            .to_string();

        assert!(verify_client_secret(&hash, "s3cret"));
        assert!(!verify_client_secret(&hash, "wrong"));
        assert!(!verify_client_secret("$argon2id$garbage", "s3cret"));
    }

    #[test]
    fn test_parse_basic_auth() {
        let header = format!("Basic {}", STANDARD.encode("cli_1:pa:ss"));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("cli_1".to_string(), "pa:ss".to_string()))
        );

        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic !!!"), None);
        assert_eq!(
            parse_basic_auth(&format!("Basic {}", STANDARD.encode("no-colon"))),
            None
        );
        assert_eq!(
            parse_basic_auth(&format!("Basic {}", STANDARD.encode(":secret"))),
            None
        );
    }

    #[test]
    fn test_parse_basic_auth_form_decodes() {
        let header = format!("Basic {}", STANDARD.encode("cli%5F1:s%2Bc%3Aret+x&y=z"));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("cli_1".to_string(), "s+c:ret x&y=z".to_string()))
        );

        let header = format!("Basic {}", STANDARD.encode("%20:secret"));
        assert_eq!(
            parse_basic_auth(&header),
            Some((" ".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_resolve_body_wins() {
        let creds = ClientCredentials::resolve(
            Some("cli_1".to_string()),
            Some("body".to_string()),
            basic("cli_2", "header"),
        );
        assert_eq!(creds.client_id.as_deref(), Some("cli_1"));
        assert_eq!(creds.client_secret.as_deref(), Some("body"));
        assert_eq!(creds.method, Some(TokenEndpointAuthMethod::ClientSecretPost));
    }

    #[test]
    fn test_resolve_header_fills_absent_body() {
        let creds = ClientCredentials::resolve(None, None, basic("cli_1", "header"));
        assert_eq!(creds.client_id.as_deref(), Some("cli_1"));
        assert_eq!(creds.client_secret.as_deref(), Some("header"));
        assert_eq!(creds.method, Some(TokenEndpointAuthMethod::ClientSecretBasic));

        let creds =
            ClientCredentials::resolve(Some("cli_1".to_string()), None, basic("cli_1", "header"));
        assert_eq!(creds.client_secret.as_deref(), Some("header"));
    }

    #[test]
    fn test_resolve_header_for_other_client_is_ignored() {
        let creds =
            ClientCredentials::resolve(Some("cli_1".to_string()), None, basic("cli_2", "header"));
        assert_eq!(creds.client_id.as_deref(), Some("cli_1"));
        assert!(creds.client_secret.is_none());
        assert_eq!(creds.method, Some(TokenEndpointAuthMethod::None));
    }

    #[test]
    fn test_require_client_id() {
        let creds = ClientCredentials::resolve(None, Some("orphan".to_string()), None);
        let err = creds.require_client_id().unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[test]
    fn test_verify_client() {
        let public = client(None);
        let creds = ClientCredentials::resolve(Some("cli_1".to_string()), None, None);
        assert!(verify_client(&public, &creds).is_ok());

        let confidential = client(Some("s3cret"));
        let err = verify_client(&confidential, &creds).unwrap_err();
        assert_eq!(err.http_status(), 401);

        let creds = ClientCredentials::resolve(None, None, basic("cli_1", "s3cret"));
        assert!(verify_client(&confidential, &creds).is_ok());

        let creds = ClientCredentials::resolve(None, None, basic("cli_1", "nope"));
        assert!(verify_client(&confidential, &creds).is_err());

        let mut inactive = client(None);
        inactive.is_active = false;
        let creds = ClientCredentials::resolve(Some("cli_1".to_string()), None, None);
        assert_eq!(
            verify_client(&inactive, &creds).unwrap_err().oauth_error_code(),
            "invalid_client"
        );
    }
}
