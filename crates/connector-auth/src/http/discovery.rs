//! Discovery endpoints.
//!
//! - `GET /.well-known/oauth-authorization-server` (RFC 8414)
//! - `GET /.well-known/jwks.json` (RFC 7517)
//! - `GET /healthz`

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use super::DiscoveryState;
use crate::oauth::client_auth::TokenEndpointAuthMethod;
use crate::oauth::pkce::PkceChallengeMethod;
use crate::types::GrantType;

/// Authorization server metadata document.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
}

impl ServerMetadata {
    /// Builds the metadata for an issuer URL.
    #[must_use]
    pub fn for_issuer(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/authorize", base),
            token_endpoint: format!("{}/token", base),
            jwks_uri: format!("{}/.well-known/jwks.json", base),
            response_types_supported: vec!["code"],
            grant_types_supported: vec![
                GrantType::AuthorizationCode.as_str(),
                GrantType::RefreshToken.as_str(),
            ],
            code_challenge_methods_supported: vec![PkceChallengeMethod::S256.as_str()],
            token_endpoint_auth_methods_supported: TokenEndpointAuthMethod::SUPPORTED
                .iter()
                .map(TokenEndpointAuthMethod::as_str)
                .collect(),
        }
    }
}

/// Handler for `GET /.well-known/oauth-authorization-server`.
pub async fn metadata_handler(State(state): State<DiscoveryState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(ServerMetadata::for_issuer(state.issuer.issuer())),
    )
}

/// Handler for `GET /.well-known/jwks.json`.
///
/// Empty key set when tokens are signed with a shared secret.
pub async fn jwks_handler(State(state): State<DiscoveryState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(state.issuer.jwks()),
    )
}

/// Handler for `GET /healthz`.
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
