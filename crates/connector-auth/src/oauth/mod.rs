//! OAuth 2.0 authorization code flow with PKCE.
//!
//! # Authorization Code Flow
//!
//! The flow is implemented across several submodules:
//!
//! - [`authorize`] - Request/response types for the authorization endpoint
//! - [`service`] - Authorization service: issuing and completing codes
//! - [`pkce`] - PKCE challenge/verifier implementation
//! - [`redirect`] - Registered redirect URI pattern matching
//! - [`client_auth`] - Client secret hashing and credential resolution
//! - [`token`] - Token endpoint request normalization and responses
//!
//! # Example
//!
//! ```ignore
//! use connector_auth::oauth::{
//!     AuthorizationService, AuthorizationConfig, PkceVerifier, PkceChallenge,
//! };
//!
//! // Client generates PKCE verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! // Server validates the request and sends the user-agent to the login surface
//! let service = AuthorizationService::new(client_storage, code_storage, config);
//! let login_url = service.authorize(&request).await?;
//! ```

pub mod authorize;
pub mod client_auth;
pub mod pkce;
pub mod redirect;
pub mod service;
pub mod token;

// Authorization endpoint types
pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
    AuthorizeRejection, CompletionRequest, CompletionResponse,
};

// Client authentication
pub use client_auth::{
    ClientCredentials, TokenEndpointAuthMethod, hash_client_secret, parse_basic_auth,
    verify_client_secret,
};

// PKCE types
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};

// Redirect matching
pub use redirect::{RedirectPattern, RedirectPatternError};

// Service types
pub use service::{AuthorizationConfig, AuthorizationService};

// Token endpoint types
pub use token::{RawTokenParams, TokenError, TokenErrorCode, TokenGrant, TokenRequest, TokenResponse};
