//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636 with the S256 method only. Any other method, including an
//! absent one, fails closed.
//!
//! # Example
//!
//! ```
//! use connector_auth::oauth::pkce::{self, PkceChallenge, PkceVerifier};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! // Server stores the challenge, later verifies the verifier from the token request
//! assert!(pkce::verify(verifier.as_str(), challenge.as_str(), Some("S256")));
//! assert!(!pkce::verify(verifier.as_str(), challenge.as_str(), Some("plain")));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of an S256 code challenge: base64url of 32 bytes without padding.
pub const CHALLENGE_LENGTH: usize = 43;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be URL-safe base64 ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge format is invalid.
    #[error("code_challenge must be exactly 43 base64url characters")]
    InvalidChallengeFormat,

    /// Unsupported challenge method (only S256 is supported).
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),
}

impl PkceError {
    /// Create an `InvalidVerifierLength` error.
    #[must_use]
    pub fn invalid_verifier_length(len: usize) -> Self {
        Self::InvalidVerifierLength(len)
    }

    /// Create an `InvalidVerifierCharacters` error.
    #[must_use]
    pub fn invalid_verifier_characters() -> Self {
        Self::InvalidVerifierCharacters
    }

    /// Create an `InvalidChallengeFormat` error.
    #[must_use]
    pub fn invalid_challenge_format() -> Self {
        Self::InvalidChallengeFormat
    }

    /// Create an `UnsupportedMethod` error.
    #[must_use]
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod(method.into())
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Verifies a code verifier against a stored challenge.
///
/// Returns `true` only when `method` is `"S256"` and
/// `BASE64URL(SHA256(code_verifier))` equals `code_challenge`.
///
/// Both sides are hashed once more before a constant-time compare, so the
/// comparison runs over fixed-size digests whatever the input lengths.
#[must_use]
pub fn verify(code_verifier: &str, code_challenge: &str, method: Option<&str>) -> bool {
    if !matches!(method.map(PkceChallengeMethod::parse), Some(Ok(PkceChallengeMethod::S256))) {
        return false;
    }

    let expected = s256(code_verifier);
    let expected_digest = Sha256::digest(expected.as_bytes());
    let supplied_digest = Sha256::digest(code_challenge.as_bytes());
    expected_digest
        .as_slice()
        .ct_eq(supplied_digest.as_slice())
        .into()
}

fn s256(input: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes()))
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method. Only S256 exists; "plain" is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash (the only supported method).
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` if the method is not "S256".
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            other => Err(PkceError::unsupported_method(other)),
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string over `[A-Za-z0-9-._~]`, 43 to 128 characters.
/// The server never needs to construct one; it exists for clients and tests.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Length is not between 43 and 128 characters
    /// - Contains characters other than `[A-Za-z0-9-._~]`
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::invalid_verifier_length(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::invalid_verifier_characters());
        }

        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// 32 random bytes encoded as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge as received in an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Create a challenge from a verifier using the S256 method.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(s256(verifier.as_str()))
    }

    /// Validate a challenge received from a client.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` unless the value is exactly
    /// 43 characters from the base64url alphabet.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        let well_formed = challenge.len() == CHALLENGE_LENGTH
            && challenge
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !well_formed {
            return Err(PkceError::invalid_challenge_format());
        }
        Ok(Self(challenge))
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the challenge and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    // -------------------------------------------------------------------------
    // RFC 7636 Test Vector
    // -------------------------------------------------------------------------

    #[test]
    fn test_rfc7636_appendix_b_test_vector() {
        let verifier = PkceVerifier::new(RFC_VERIFIER.to_string()).unwrap();
        let challenge = PkceChallenge::from_verifier(&verifier);
        assert_eq!(challenge.as_str(), RFC_CHALLENGE);
        assert!(verify(RFC_VERIFIER, RFC_CHALLENGE, Some("S256")));
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    #[test]
    fn test_verify_wrong_verifier() {
        let other = PkceVerifier::generate();
        assert!(!verify(other.as_str(), RFC_CHALLENGE, Some("S256")));
    }

    #[test]
    fn test_verify_fails_closed_on_method() {
        assert!(!verify(RFC_VERIFIER, RFC_CHALLENGE, None));
        assert!(!verify(RFC_VERIFIER, RFC_CHALLENGE, Some("plain")));
        assert!(!verify(RFC_VERIFIER, RFC_CHALLENGE, Some("s256")));
        assert!(!verify(RFC_VERIFIER, RFC_CHALLENGE, Some("")));
    }

    #[test]
    fn test_verify_plain_equality_is_not_enough() {
        // A "plain" style exchange where verifier == challenge must not pass
        assert!(!verify(RFC_CHALLENGE, RFC_CHALLENGE, Some("S256")));
    }

    #[test]
    fn test_verify_length_mismatch() {
        assert!(!verify(RFC_VERIFIER, "short", Some("S256")));
        assert!(!verify(RFC_VERIFIER, "", Some("S256")));
        let long = format!("{}{}", RFC_CHALLENGE, "A");
        assert!(!verify(RFC_VERIFIER, &long, Some("S256")));
    }

    // -------------------------------------------------------------------------
    // Verifier
    // -------------------------------------------------------------------------

    #[test]
    fn test_verifier_generation() {
        let verifier = PkceVerifier::generate();
        assert_eq!(verifier.as_str().len(), 43);
        assert!(PkceVerifier::new(verifier.as_str().to_string()).is_ok());
    }

    #[test]
    fn test_verifier_validation_length() {
        assert!(matches!(
            PkceVerifier::new("a".repeat(42)),
            Err(PkceError::InvalidVerifierLength(42))
        ));
        assert!(PkceVerifier::new("a".repeat(43)).is_ok());
        assert!(PkceVerifier::new("a".repeat(128)).is_ok());
        assert!(matches!(
            PkceVerifier::new("a".repeat(129)),
            Err(PkceError::InvalidVerifierLength(129))
        ));
    }

    #[test]
    fn test_verifier_validation_characters() {
        let valid = format!("{}-._~", "a".repeat(40));
        assert!(PkceVerifier::new(valid).is_ok());

        let invalid = format!("{}+/=", "a".repeat(40));
        assert!(matches!(
            PkceVerifier::new(invalid),
            Err(PkceError::InvalidVerifierCharacters)
        ));
    }

    // -------------------------------------------------------------------------
    // Challenge
    // -------------------------------------------------------------------------

    #[test]
    fn test_challenge_new_valid() {
        let challenge = PkceChallenge::new(RFC_CHALLENGE.to_string()).unwrap();
        assert_eq!(challenge.into_inner(), RFC_CHALLENGE);
    }

    #[test]
    fn test_challenge_new_invalid() {
        // 42 characters
        assert!(PkceChallenge::new(RFC_CHALLENGE[..42].to_string()).is_err());
        // 44 characters
        assert!(PkceChallenge::new(format!("{}A", RFC_CHALLENGE)).is_err());
        // standard base64 alphabet
        let with_plus = RFC_CHALLENGE.replace('-', "+");
        assert!(PkceChallenge::new(with_plus).is_err());
        // padding
        assert!(PkceChallenge::new(format!("{}=", &RFC_CHALLENGE[..42])).is_err());
    }

    #[test]
    fn test_challenge_method() {
        assert_eq!(PkceChallengeMethod::parse("S256").unwrap(), PkceChallengeMethod::S256);
        assert!(matches!(
            PkceChallengeMethod::parse("plain"),
            Err(PkceError::UnsupportedMethod(_))
        ));
        assert_eq!(PkceChallengeMethod::default().to_string(), "S256");
    }
}
