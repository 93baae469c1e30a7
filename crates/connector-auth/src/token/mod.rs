//! Access tokens and the token endpoint grant exchanges.
//!
//! - [`jwt`] - Signing keys, access token claims and the issuer
//! - [`service`] - Authorization code redemption and refresh token rotation

pub mod jwt;
pub mod service;

pub use jwt::{
    ACCESS_TOKEN_TYPE, AccessTokenClaims, AccessTokenIssuer, Jwk, JwtError, Jwks,
    SigningAlgorithm, SigningKeyPair,
};
pub use service::{TokenConfig, TokenService, determine_refresh_scope};
