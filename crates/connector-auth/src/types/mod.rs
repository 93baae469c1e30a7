//! Domain types shared by the authorize and token flows.
//!
//! - [`Client`] - Registered relying client (read from the external registry)
//! - [`GrantType`] - Supported OAuth grant types
//! - [`AuthorizationCode`] - Single-use authorization code record
//! - [`RefreshToken`] - Hashed, rotating refresh token record

pub mod authorization_code;
pub mod client;
pub mod refresh_token;

pub use authorization_code::{AuthorizationCode, CodeStatus};
pub use client::{Client, ClientValidationError, GrantType};
pub use refresh_token::RefreshToken;
