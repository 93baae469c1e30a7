//! JWT access token signing and verification.
//!
//! ## Supported Algorithms
//!
//! - **HS256**: HMAC with SHA-256, shared secret
//! - **RS256**: RSA with SHA-256 (widely compatible)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve (smaller keys)
//!
//! ## Example
//!
//! ```ignore
//! use connector_auth::token::jwt::{AccessTokenIssuer, SigningKeyPair, SigningAlgorithm};
//!
//! let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)?;
//! let issuer = AccessTokenIssuer::new(key_pair, "https://auth.example.com", Duration::from_secs(3600));
//!
//! let claims = issuer.claims_for("u1", "t1", "cli_1", "orders:read");
//! let token = issuer.issue(&claims)?;
//! let verified = issuer.verify(&token)?;
//! ```

use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::config::{MIN_HMAC_SECRET_LEN, SigningConfig};

/// Value of the `type` claim on access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared secret.
    HS256,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Parses an algorithm name as used in configuration and JWT headers.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "HS256" => Some(Self::HS256),
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }

    /// Returns `true` if verification needs the signing secret.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Access token claims.
///
/// ```json
/// {
///   "iss": "https://auth.example.com",
///   "sub": "u1",
///   "orgId": "t1",
///   "scope": "orders:read",
///   "type": "access",
///   "client_id": "cli_1",
///   "iat": 1700000000,
///   "exp": 1700003600,
///   "jti": "5d0c..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Issuer (authorization server URL).
    pub iss: String,

    /// Subject: the approving user.
    pub sub: String,

    /// Tenant the grant belongs to.
    #[serde(rename = "orgId")]
    pub org_id: String,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Always [`ACCESS_TOKEN_TYPE`].
    #[serde(rename = "type")]
    pub token_type: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID (unique identifier).
    pub jti: String,
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key for access tokens.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Encoding key (private key or secret) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key or secret) for verification.
    decoding_key: DecodingKey,

    /// Public key data for JWKS export.
    public_key_data: PublicKeyData,

    /// When the key was created or loaded.
    pub created_at: OffsetDateTime,
}

/// Internal representation of public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
    // Shared secrets are never published
    Symmetric,
}

impl SigningKeyPair {
    /// Creates an HS256 key from a shared secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_HMAC_SECRET_LEN`] bytes.
    pub fn from_secret(kid: impl Into<String>, secret: &[u8]) -> Result<Self, JwtError> {
        if secret.len() < MIN_HMAC_SECRET_LEN {
            return Err(JwtError::invalid_key(format!(
                "HMAC secret must be at least {} bytes",
                MIN_HMAC_SECRET_LEN
            )));
        }

        Ok(Self {
            kid: kid.into(),
            algorithm: SigningAlgorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            public_key_data: PublicKeyData::Symmetric,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC key pair using P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        Self::from_ec_secret(uuid::Uuid::new_v4().to_string(), &secret_key)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))
    }

    fn from_ec_secret(kid: String, secret_key: &EcSecretKey) -> Result<Self, JwtError> {
        let signing_key = EcSigningKey::from(secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

        // jsonwebtoken only reads PKCS8 EC keys
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads an asymmetric key pair from PEM strings.
    ///
    /// RSA private keys may be PKCS#1 or PKCS#8. EC private keys may be SEC1 or
    /// PKCS#8. The pair is checked by signing and verifying a throwaway token.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid, the algorithm is HS256, or
    /// the public key does not belong to the private key.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let kid = kid.into();
        let key_pair = match algorithm {
            SigningAlgorithm::HS256 => {
                return Err(JwtError::invalid_key("HS256 keys are loaded from a secret"));
            }
            SigningAlgorithm::RS256 | SigningAlgorithm::RS384 => {
                let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;

                let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let n = public_key.n().to_bytes_be();
                let e = public_key.e().to_bytes_be();

                Self {
                    kid,
                    algorithm,
                    encoding_key,
                    decoding_key,
                    public_key_data: PublicKeyData::Rsa { n, e },
                    created_at: OffsetDateTime::now_utc(),
                }
            }
            SigningAlgorithm::ES384 => {
                let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                    .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let public_key = p384::PublicKey::from_public_key_pem(public_pem)
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                if secret_key.public_key() != public_key {
                    return Err(JwtError::invalid_key(
                        "Public key does not match private key",
                    ));
                }
                Self::from_ec_secret(kid, &secret_key)?
            }
        };

        key_pair.self_check()?;
        Ok(key_pair)
    }

    /// Builds the signing key described by configuration.
    ///
    /// Asymmetric algorithms without configured PEMs get an ephemeral key pair,
    /// so tokens stop verifying after a restart.
    ///
    /// # Errors
    /// Returns an error for an unknown algorithm, a missing or short HS256
    /// secret, or invalid PEM data.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        let algorithm = SigningAlgorithm::parse(&config.algorithm).ok_or_else(|| {
            JwtError::invalid_key(format!("Unsupported algorithm: {}", config.algorithm))
        })?;
        let kid = config
            .kid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if algorithm.is_symmetric() {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| JwtError::invalid_key("HS256 requires signing.secret"))?;
            return Self::from_secret(kid, secret.as_bytes());
        }

        match (&config.private_key_pem, &config.public_key_pem) {
            (Some(private_pem), Some(public_pem)) => {
                Self::from_pem(kid, algorithm, private_pem, public_pem)
            }
            _ => {
                warn!(
                    algorithm = %algorithm,
                    "No signing key configured, generating an ephemeral key pair"
                );
                let mut key_pair = if algorithm.is_ec() {
                    Self::generate_ec()?
                } else {
                    Self::generate_rsa(algorithm)?
                };
                if let Some(kid) = &config.kid {
                    key_pair.kid = kid.clone();
                }
                Ok(key_pair)
            }
        }
    }

    fn self_check(&self) -> Result<(), JwtError> {
        #[derive(Serialize, Deserialize)]
        struct SelfCheck {
            exp: i64,
        }

        let sample = SelfCheck {
            exp: OffsetDateTime::now_utc().unix_timestamp() + 60,
        };
        let token = encode(
            &Header::new(self.algorithm.to_jwt_algorithm()),
            &sample,
            &self.encoding_key,
        )
        .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let validation = Validation::new(self.algorithm.to_jwt_algorithm());
        decode::<SelfCheck>(&token, &self.decoding_key, &validation)
            .map(|_| ())
            .map_err(|_| JwtError::invalid_key("Public key does not match private key"))
    }

    /// Exports the public key as a JWK. `None` for HS256.
    #[must_use]
    pub fn to_jwk(&self) -> Option<Jwk> {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Some(Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            }),
            PublicKeyData::Ec { x, y } => Some(Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            }),
            PublicKeyData::Symmetric => None,
        }
    }
}

// ============================================================================
// Access Token Issuer
// ============================================================================

/// Mints and verifies access tokens.
///
/// This type is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
pub struct AccessTokenIssuer {
    signing_key: SigningKeyPair,
    issuer: String,
    lifetime: Duration,
}

impl AccessTokenIssuer {
    /// Creates a new issuer.
    ///
    /// # Arguments
    /// * `signing_key` - The key pair to use for signing/verification
    /// * `issuer` - The issuer claim value (typically the server URL)
    /// * `lifetime` - Access token lifetime
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
            lifetime,
        }
    }

    /// Builds the claims for a new access token starting now.
    #[must_use]
    pub fn claims_for(
        &self,
        user_id: &str,
        tenant_id: &str,
        client_id: &str,
        scope: &str,
    ) -> AccessTokenClaims {
        let now = OffsetDateTime::now_utc();
        AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            org_id: tenant_id.to_string(),
            scope: scope.to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            client_id: client_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + self.lifetime).unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Signs access token claims.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        self.encode(claims)
    }

    /// Verifies an access token and returns its claims.
    ///
    /// # Errors
    /// Returns an error if the signature, issuer or expiry is invalid, or the
    /// token is not an access token.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let claims = self.decode::<AccessTokenClaims>(token)?.claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(JwtError::invalid_claims(format!(
                "Expected token type '{}', got '{}'",
                ACCESS_TOKEN_TYPE, claims.token_type
            )));
        }
        Ok(claims)
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false;

        decode(token, &self.signing_key.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Access token lifetime in whole seconds.
    #[must_use]
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime.as_secs()
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.signing_key.algorithm
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the JWKS containing the public key, empty for HS256.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self.signing_key.to_jwk().into_iter().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://auth.example.com";
    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn hmac_issuer() -> AccessTokenIssuer {
        let key = SigningKeyPair::from_secret("k1", SECRET).unwrap();
        AccessTokenIssuer::new(key, ISSUER, Duration::from_secs(3600))
    }

    #[test]
    fn test_hs256_issue_verify() {
        let issuer = hmac_issuer();
        let claims = issuer.claims_for("u1", "t1", "cli_1", "orders:read");
        assert_eq!(claims.exp - claims.iat, 3600);

        let token = issuer.issue(&claims).unwrap();
        let verified = issuer.verify(&token).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.sub, "u1");
        assert_eq!(verified.org_id, "t1");
        assert_eq!(verified.token_type, "access");
    }

    #[test]
    fn test_claims_wire_names() {
        let claims = hmac_issuer().claims_for("u1", "t1", "cli_1", "a b");
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["orgId"], "t1");
        assert_eq!(json["type"], "access");
        assert_eq!(json["client_id"], "cli_1");
        assert!(json.get("org_id").is_none());
        assert!(json.get("token_type").is_none());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SigningKeyPair::from_secret("k1", b"short").is_err());
    }

    #[test]
    fn test_rs256_issue_verify() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let issuer = AccessTokenIssuer::new(key_pair, ISSUER, Duration::from_secs(3600));

        let claims = issuer.claims_for("u1", "t1", "cli_1", "orders:read");
        let token = issuer.issue(&claims).unwrap();
        assert_eq!(issuer.verify(&token).unwrap().sub, "u1");
        assert_eq!(issuer.jwks().keys.len(), 1);
        assert_eq!(issuer.jwks().keys[0].kid, issuer.current_kid());
    }

    #[test]
    fn test_es384_issue_verify() {
        let key_pair = SigningKeyPair::generate_ec().unwrap();
        let issuer = AccessTokenIssuer::new(key_pair, ISSUER, Duration::from_secs(60));

        let claims = issuer.claims_for("u1", "t1", "cli_1", "");
        let token = issuer.issue(&claims).unwrap();
        assert_eq!(issuer.verify(&token).unwrap().org_id, "t1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = hmac_issuer();
        let mut claims = issuer.claims_for("u1", "t1", "cli_1", "");
        claims.iat -= 7200;
        claims.exp -= 7200;

        let token = issuer.issue(&claims).unwrap();
        assert!(matches!(issuer.verify(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let issuer1 = hmac_issuer();
        let key2 = SigningKeyPair::from_secret("k2", b"fedcba9876543210fedcba9876543210").unwrap();
        let issuer2 = AccessTokenIssuer::new(key2, ISSUER, Duration::from_secs(3600));

        let token = issuer1.issue(&issuer1.claims_for("u1", "t1", "cli_1", "")).unwrap();
        assert!(matches!(issuer2.verify(&token), Err(JwtError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other = AccessTokenIssuer::new(
            SigningKeyPair::from_secret("k1", SECRET).unwrap(),
            "https://other.example.com",
            Duration::from_secs(3600),
        );
        let token = other.issue(&other.claims_for("u1", "t1", "cli_1", "")).unwrap();
        let err = hmac_issuer().verify(&token).unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_non_access_type_rejected() {
        let issuer = hmac_issuer();
        let mut claims = issuer.claims_for("u1", "t1", "cli_1", "");
        claims.token_type = "refresh".to_string();
        let token = issuer.issue(&claims).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(JwtError::InvalidClaims { .. })
        ));
    }

    #[test]
    fn test_hs256_jwks_is_empty() {
        assert!(hmac_issuer().jwks().keys.is_empty());
    }

    #[test]
    fn test_jwks_generation_ec() {
        let key_pair = SigningKeyPair::generate_ec().unwrap();
        let jwk = key_pair.to_jwk().unwrap();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.alg, "ES384");
        assert_eq!(jwk.crv.as_deref(), Some("P-384"));
        assert!(jwk.n.is_none());

        let json = serde_json::to_string(&jwk).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
    }

    #[test]
    fn test_from_pem_rsa_roundtrip_and_mismatch() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        let key = SigningKeyPair::from_pem("rsa-1", SigningAlgorithm::RS384, &private_pem, &public_pem)
            .unwrap();
        assert_eq!(key.kid, "rsa-1");
        assert_eq!(key.to_jwk().unwrap().alg, "RS384");

        let other_public = RsaPrivateKey::new(&mut OsRng, 2048)
            .unwrap()
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let err = SigningKeyPair::from_pem("rsa-1", SigningAlgorithm::RS256, &private_pem, &other_public)
            .err()
            .unwrap();
        assert!(err.is_key_error());
    }

    #[test]
    fn test_from_pem_ec() {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        let key = SigningKeyPair::from_pem("ec-1", SigningAlgorithm::ES384, &private_pem, &public_pem)
            .unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::ES384);
    }

    #[test]
    fn test_from_config() {
        let mut config = SigningConfig {
            algorithm: "HS256".to_string(),
            kid: Some("cfg".to_string()),
            secret: Some(String::from_utf8(SECRET.to_vec()).unwrap()),
            ..SigningConfig::default()
        };
        let key = SigningKeyPair::from_config(&config).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::HS256);
        assert_eq!(key.kid, "cfg");

        config.algorithm = "ES384".to_string();
        let key = SigningKeyPair::from_config(&config).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::ES384);
        assert_eq!(key.kid, "cfg");

        config.algorithm = "none".to_string();
        assert!(SigningKeyPair::from_config(&config).is_err());
    }

    #[test]
    fn test_signing_algorithm_properties() {
        assert_eq!(SigningAlgorithm::parse("RS384"), Some(SigningAlgorithm::RS384));
        assert_eq!(SigningAlgorithm::parse("rs384"), None);
        assert!(SigningAlgorithm::HS256.is_symmetric());
        assert!(SigningAlgorithm::RS256.is_rsa());
        assert!(SigningAlgorithm::ES384.is_ec());
        assert_eq!(SigningAlgorithm::ES384.to_string(), "ES384");
    }

    #[test]
    fn test_jwt_error_predicates() {
        assert!(JwtError::Expired.is_validation_error());
        assert!(JwtError::InvalidSignature.is_validation_error());
        assert!(!JwtError::Expired.is_key_error());
        assert!(JwtError::invalid_key("err").is_key_error());
    }
}
