//! Storage traits for authorization data.
//!
//! This module defines storage interfaces for:
//!
//! - OAuth client registrations (read-only)
//! - Authorization codes
//! - Refresh tokens
//!
//! Implementations must be shared across instances. Codes and refresh tokens
//! change state through compare-and-set operations, never read-modify-write.
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `connector-auth-postgres` - PostgreSQL storage backend

pub mod authorization_code;
pub mod client;
pub mod refresh_token;

pub use authorization_code::AuthorizationCodeStorage;
pub use client::ClientStorage;
pub use refresh_token::RefreshTokenStorage;
