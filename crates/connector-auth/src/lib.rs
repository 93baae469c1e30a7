//! # connector-auth
//!
//! OAuth 2.0 authorization server core for platform connectors.
//!
//! This crate provides:
//! - The authorization code grant with mandatory PKCE (S256 only)
//! - Single-use authorization codes with replay detection
//! - Hashed, rotating refresh tokens with scope-downgrade enforcement
//! - Signed JWT access tokens carrying subject, tenant and scope claims
//! - Axum handlers for the `/authorize` and `/token` endpoints
//!
//! ## Overview
//!
//! A relying client sends the user-agent to `/authorize`. The request is validated
//! against the client registry, an unclaimed authorization code is persisted and the
//! user-agent is handed to the external login surface. Once the login surface has
//! authenticated the user it calls back into the completion step, which claims the
//! code for the user and tenant. The client then redeems the code at `/token`.
//!
//! All durable state lives behind the traits in [`storage`]; a PostgreSQL backend is
//! provided by the `connector-auth-postgres` crate.
//!
//! ## Modules
//!
//! - [`config`] - Lifetimes, timeouts and signing key configuration
//! - [`error`] - Error taxonomy and OAuth error code mapping
//! - [`oauth`] - PKCE, redirect matching, authorization requests and the authorize flow
//! - [`token`] - Access token issuing and the token grant exchanges
//! - [`storage`] - Storage traits for clients, authorization codes and refresh tokens
//! - [`types`] - Domain types
//! - [`http`] - Axum HTTP handlers

pub mod config;
pub mod deadline;
pub mod error;
pub mod http;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{AuthConfig, ConfigError, SigningConfig};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthorizeState, DiscoveryState, TokenState};
pub use oauth::{AuthorizationConfig, AuthorizationService};
pub use storage::{AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage};
pub use token::{AccessTokenClaims, AccessTokenIssuer, TokenConfig, TokenService};
pub use types::{AuthorizationCode, Client, RefreshToken};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use connector_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError, SigningConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{AuthorizeState, DiscoveryState, TokenState};
    pub use crate::oauth::{AuthorizationConfig, AuthorizationService};
    pub use crate::storage::{AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage};
    pub use crate::token::{AccessTokenClaims, AccessTokenIssuer, TokenConfig, TokenService};
    pub use crate::types::{AuthorizationCode, Client, RefreshToken};
}
