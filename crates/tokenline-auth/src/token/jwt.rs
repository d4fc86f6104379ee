//! Signed-token codec.
//!
//! Access and refresh credentials are both JWTs signed with the same key.
//! They are told apart by the explicit `token_use` claim, never by lifetime.
//!
//! ## Supported Algorithms
//!
//! - **HS256 / HS384 / HS512**: HMAC with a shared secret
//! - **RS256 / RS384**: RSA, keys loaded from PEM
//! - **ES384**: ECDSA P-384, keys loaded from PEM (PKCS#8)
//!
//! ## Expiry
//!
//! `exp` is checked against the codec's [`Clock`] rather than the system
//! clock, so simulated time drives credential expiry the same way it drives
//! store expiry. A credential is expired at `now >= exp`.
//!
//! ## Example
//!
//! ```ignore
//! use tokenline_auth::token::jwt::{SigningKey, SigningAlgorithm, TokenCodec, TokenKind};
//!
//! let key = SigningKey::from_secret(SigningAlgorithm::HS256, b"secret")?;
//! let codec = TokenCodec::new(key, "https://auth.example.com", clock);
//!
//! let issued = codec.issue("user-1", TokenKind::Access, &roles, Duration::minutes(15))?;
//! let claims = codec.verify(&issued.token)?;
//! ```

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::clock::DynClock;
use crate::config::SigningConfig;
use crate::error::{AuthError, ExpiryHorizon};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a credential.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// The credential could not be parsed.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the parse failure.
        message: String,
    },

    /// The credential has expired.
    #[error("Token expired")]
    Expired,

    /// The credential signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The credential claims are invalid (wrong issuer, missing claim, wrong kind).
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl CodecError {
    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
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

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the presented credential was rejected
    /// (as opposed to a local key or encoding failure).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. }
                | Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for CodecError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::malformed(err.to_string()),
        }
    }
}

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Expired => AuthError::expired(ExpiryHorizon::Credential),
            CodecError::Encoding { message } | CodecError::InvalidKey { message } => {
                AuthError::internal(message)
            }
            other => AuthError::malformed(other.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an HMAC algorithm.
    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(CodecError::invalid_key(format!(
                "Unsupported signing algorithm: {other}"
            ))),
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Discriminates access credentials from refresh credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived credential authorizing individual requests.
    Access,
    /// Long-lived credential used only to obtain a new pair.
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by every credential minted by the codec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (owning identity).
    pub sub: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID. Makes every credential unique even within the same second.
    pub jti: String,

    /// Credential kind marker.
    pub token_use: TokenKind,

    /// Roles of the subject at issuance time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl CredentialClaims {
    /// Returns the expiry as an `OffsetDateTime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `exp` is out of range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, CodecError> {
        OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|e| CodecError::invalid_claims(format!("exp out of range: {e}")))
    }

    /// Returns the remaining lifetime at `now`, or `None` once expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> Option<Duration> {
        let remaining = Duration::seconds(self.exp - now.unix_timestamp());
        remaining.is_positive().then_some(remaining)
    }
}

/// A freshly minted credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Raw signed value handed to the caller.
    pub token: String,

    /// The claims embedded in `token`.
    pub claims: CredentialClaims,
}

// ============================================================================
// Signing Key
// ============================================================================

/// Key material for signing and verifying credentials.
pub struct SigningKey {
    /// Key ID written into the JWT header.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Creates an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not HMAC-based or the secret is empty.
    pub fn from_secret(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, CodecError> {
        if !algorithm.is_hmac() {
            return Err(CodecError::invalid_key(format!(
                "Algorithm {} is not HMAC-based",
                algorithm
            )));
        }
        if secret.is_empty() {
            return Err(CodecError::invalid_key("HMAC secret cannot be empty"));
        }

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Loads an RSA or EC key pair from PEM strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is HMAC-based or the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, CodecError> {
        let (encoding_key, decoding_key) = if algorithm.is_rsa() {
            (
                EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| CodecError::invalid_key(e.to_string()))?,
                DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| CodecError::invalid_key(e.to_string()))?,
            )
        } else if algorithm == SigningAlgorithm::ES384 {
            (
                EncodingKey::from_ec_pem(private_pem.as_bytes())
                    .map_err(|e| CodecError::invalid_key(e.to_string()))?,
                DecodingKey::from_ec_pem(public_pem.as_bytes())
                    .map_err(|e| CodecError::invalid_key(e.to_string()))?,
            )
        } else {
            return Err(CodecError::invalid_key(format!(
                "Algorithm {} does not use PEM keys",
                algorithm
            )));
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Builds a key from configuration, reading PEM files when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is unknown, key material is missing,
    /// or a PEM file cannot be read.
    pub fn from_config(config: &SigningConfig) -> Result<Self, CodecError> {
        let algorithm: SigningAlgorithm = config.algorithm.parse()?;

        if algorithm.is_hmac() {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| CodecError::invalid_key("signing.secret is not set"))?;
            return Self::from_secret(algorithm, secret.as_bytes());
        }

        let read = |path: Option<&String>, what: &str| -> Result<String, CodecError> {
            let path = path.ok_or_else(|| CodecError::invalid_key(format!("{what} is not set")))?;
            std::fs::read_to_string(path)
                .map_err(|e| CodecError::invalid_key(format!("Failed to read {path}: {e}")))
        };

        let private_pem = read(config.private_key_path.as_ref(), "signing.private_key_path")?;
        let public_pem = read(config.public_key_path.as_ref(), "signing.public_key_path")?;

        Self::from_pem(
            Uuid::new_v4().to_string(),
            algorithm,
            &private_pem,
            &public_pem,
        )
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Token Codec
// ============================================================================

/// Mints and verifies signed credentials.
///
/// Pure CPU work: no I/O. Thread-safe and shareable across tasks.
pub struct TokenCodec {
    signing_key: SigningKey,
    issuer: String,
    clock: DynClock,
}

impl TokenCodec {
    /// Creates a new codec.
    #[must_use]
    pub fn new(signing_key: SigningKey, issuer: impl Into<String>, clock: DynClock) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
            clock,
        }
    }

    /// Returns the issuer claim value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mints a credential valid for `ttl` from the clock's current instant.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        roles: &[String],
        ttl: Duration,
    ) -> Result<IssuedCredential, CodecError> {
        let now = self.clock.now();
        self.issue_until(subject, kind, roles, now, now + ttl)
    }

    /// Mints a credential issued at `issued_at` and expiring at `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue_until(
        &self,
        subject: &str,
        kind: TokenKind,
        roles: &[String],
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<IssuedCredential, CodecError> {
        let claims = CredentialClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use: kind,
            roles: roles.to_vec(),
        };

        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        let token = encode(&header, &claims, &self.signing_key.encoding_key)
            .map_err(|e| CodecError::encoding(e.to_string()))?;

        Ok(IssuedCredential { token, claims })
    }

    /// Verifies signature, issuer and expiry.
    ///
    /// Fails closed: any parse or signature error is a rejection.
    ///
    /// # Errors
    ///
    /// Returns `Expired`, `InvalidSignature`, `InvalidClaims` or `Malformed`.
    pub fn verify(&self, token: &str) -> Result<CredentialClaims, CodecError> {
        let claims = self.verify_allow_expired(token)?;

        if self.clock.now().unix_timestamp() >= claims.exp {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }

    /// Verifies a credential of a specific kind.
    ///
    /// # Errors
    ///
    /// Same as [`TokenCodec::verify`], plus `InvalidClaims` on a kind mismatch.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<CredentialClaims, CodecError> {
        let claims = self.verify(token)?;
        if claims.token_use != kind {
            return Err(CodecError::invalid_claims(format!(
                "expected {} credential, got {}",
                kind, claims.token_use
            )));
        }
        Ok(claims)
    }

    /// Verifies signature and issuer but not expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature or structure is invalid.
    pub fn verify_allow_expired(&self, token: &str) -> Result<CredentialClaims, CodecError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked against the injected clock instead.
        validation.validate_exp = false;
        validation.validate_aud = false;

        decode::<CredentialClaims>(token, &self.signing_key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(CodecError::from)
    }

    /// Returns the kind of a credential from its explicit claim.
    ///
    /// The signature is checked; expiry is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature or structure is invalid.
    pub fn kind_of(&self, token: &str) -> Result<TokenKind, CodecError> {
        self.verify_allow_expired(token).map(|c| c.token_use)
    }
}

// ============================================================================
// Tests
// ============================================================================
