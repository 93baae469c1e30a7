//! HTTP handlers for the OAuth 2.0 endpoints.
//!
//! # Available Handlers
//!
//! - [`authorize`] - `GET /authorize` and the `POST /authorize` completion callback
//! - [`token`] - `POST /token` and its CORS preflight
//! - [`discovery`] - Server metadata, JWKS and health

pub mod authorize;
pub mod discovery;
pub mod token;

use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AuthError;
use crate::oauth::AuthorizationService;
use crate::token::{AccessTokenIssuer, TokenService};

pub use authorize::{authorize_complete, authorize_get};
pub use discovery::{health_handler, jwks_handler, metadata_handler};
pub use token::{token_handler, token_preflight_handler};

/// State for the authorize endpoints.
#[derive(Clone)]
pub struct AuthorizeState {
    /// Authorization service for issuing and completing codes.
    pub authorization_service: Arc<AuthorizationService>,
}

impl AuthorizeState {
    /// Creates a new authorize state.
    pub fn new(authorization_service: Arc<AuthorizationService>) -> Self {
        Self {
            authorization_service,
        }
    }
}

/// State for the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    /// Token service for the grant exchanges.
    pub token_service: Arc<TokenService>,
}

impl TokenState {
    /// Creates a new token state.
    pub fn new(token_service: Arc<TokenService>) -> Self {
        Self { token_service }
    }
}

/// State for the discovery and JWKS endpoints.
#[derive(Clone)]
pub struct DiscoveryState {
    /// Issuer whose keys and URL are published.
    pub issuer: Arc<AccessTokenIssuer>,
}

impl DiscoveryState {
    /// Creates a new discovery state.
    pub fn new(issuer: Arc<AccessTokenIssuer>) -> Self {
        Self { issuer }
    }
}

/// Builds a JSON `{error, error_description}` response for an error that is
/// answered directly rather than redirected.
pub fn error_response(error: &AuthError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "error": error.oauth_error_code(),
            "error_description": error.description(),
        })),
    )
        .into_response()
}
