//! Authorization code records.
//!
//! # Lifecycle
//!
//! 1. Created unclaimed when an authorization request is validated
//! 2. Claimed once the login surface reports the approving user and tenant
//! 3. Redeemed exactly once at the token endpoint
//!
//! An unclaimed code the user refuses becomes denied instead, which is final.
//! A record never moves backward through these states and is never deleted;
//! a redeemed record is kept so that a later replay can be recognised.
//!
//! # Security
//!
//! - Codes are cryptographically random (256 bits)
//! - Expiry is fixed at creation and never extended
//! - The PKCE challenge is stored for verification at redemption

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where an authorization code is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    /// Issued, waiting for the login surface.
    Unclaimed,
    /// Bound to an approving user, waiting for redemption.
    Claimed,
    /// Exchanged for tokens. Any further use is a replay.
    Redeemed,
    /// Refused by the user. Can never be claimed or redeemed.
    Denied,
}

/// Authorization code stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCode {
    /// The code itself. 256-bit random value, base64url-encoded.
    pub code: String,

    /// Client that initiated the request.
    pub client_id: String,

    /// Redirect URI from the authorization request.
    /// Must match the token request's redirect_uri exactly.
    pub redirect_uri: String,

    /// Requested scopes (space-separated, possibly empty).
    pub scope: String,

    /// State parameter from the authorization request.
    pub state: String,

    /// PKCE code challenge.
    pub code_challenge: String,

    /// PKCE challenge method (always "S256").
    pub code_challenge_method: String,

    /// Tenant the grant belongs to. Initialised from the client and
    /// overwritten by the login surface on claim.
    pub tenant_id: String,

    /// Approving user. Set exactly once, on claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When the code was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the code stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the code was redeemed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub used_at: Option<OffsetDateTime>,

    /// When the user refused the request.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub denied_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// Generates a cryptographically secure authorization code.
    ///
    /// 32 random bytes, base64url-encoded without padding (43 characters).
    #[must_use]
    pub fn generate_code() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> CodeStatus {
        if self.used_at.is_some() {
            CodeStatus::Redeemed
        } else if self.denied_at.is_some() {
            CodeStatus::Denied
        } else if self.user_id.is_some() {
            CodeStatus::Claimed
        } else {
            CodeStatus::Unclaimed
        }
    }

    /// Returns `true` if the code has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the code has already been redeemed.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Returns `true` if the user refused the request.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.denied_at.is_some()
    }

    /// Returns `true` if a user has approved the request.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn create_test_code(expires_at: OffsetDateTime) -> AuthorizationCode {
        AuthorizationCode {
            code: AuthorizationCode::generate_code(),
            client_id: "cli_1".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            scope: "orders:read".to_string(),
            state: "xyz".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            tenant_id: "t1".to_string(),
            user_id: None,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            used_at: None,
            denied_at: None,
        }
    }

    #[test]
    fn test_generate_code_length() {
        // 32 bytes = 256 bits, base64url encoded = 43 characters (no padding)
        assert_eq!(AuthorizationCode::generate_code().len(), 43);
    }

    #[test]
    fn test_generate_code_is_base64url() {
        let code = AuthorizationCode::generate_code();
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_code_uniqueness() {
        let mut codes: Vec<String> = (0..100).map(|_| AuthorizationCode::generate_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 100);
    }

    #[test]
    fn test_status_transitions() {
        let now = OffsetDateTime::now_utc();
        let mut code = create_test_code(now + Duration::minutes(10));
        assert_eq!(code.status(), CodeStatus::Unclaimed);

        code.user_id = Some("u1".to_string());
        assert_eq!(code.status(), CodeStatus::Claimed);
        assert!(code.is_claimed());

        code.used_at = Some(now);
        assert_eq!(code.status(), CodeStatus::Redeemed);
        assert!(code.is_used());

        let mut refused = create_test_code(now + Duration::minutes(10));
        refused.denied_at = Some(now);
        assert_eq!(refused.status(), CodeStatus::Denied);
        assert!(refused.is_denied());
    }

    #[test]
    fn test_is_expired() {
        let now = OffsetDateTime::now_utc();

        let code = create_test_code(now + Duration::minutes(10));
        assert!(!code.is_expired());

        let code = create_test_code(now - Duration::seconds(1));
        assert!(code.is_expired());

        // Expiry instant itself is already expired
        let code = create_test_code(now);
        assert!(code.is_expired_at(now));
    }

    #[test]
    fn test_serialization() {
        let code = create_test_code(OffsetDateTime::now_utc() + Duration::minutes(10));
        let json = serde_json::to_value(&code).unwrap();
        assert_eq!(json["clientId"], "cli_1");
        assert_eq!(json["codeChallengeMethod"], "S256");
        assert!(json.get("userId").is_none());
        assert!(json.get("usedAt").is_none());

        let back: AuthorizationCode = serde_json::from_value(json).unwrap();
        assert_eq!(back.code, code.code);
        assert_eq!(back.status(), CodeStatus::Unclaimed);
    }
}
