//! Token lifecycle configuration.
//!
//! All durations are deserialized with `humantime_serde`, so configuration
//! files can say `sliding_window = "30d"` or `access_ttl = "15m"`.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//!
//! [auth.tokens]
//! access_ttl = "15m"
//! sliding_window = "30d"
//! absolute_lifetime = "90d"
//!
//! [auth.cleanup]
//! interval = "1h"
//! batch_size = 500
//! revocation_retention = "7d"
//!
//! [auth.signing]
//! algorithm = "HS256"
//! secret = "change-me"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the token lifecycle engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer claim written into every credential and required on verification.
    pub issuer: String,

    /// Credential lifetimes and rotation behavior.
    pub tokens: TokenLifecycleConfig,

    /// Store garbage collection.
    pub cleanup: CleanupConfig,

    /// In-process revocation cache settings.
    pub revocation: RevocationConfig,

    /// Credential signing.
    pub signing: SigningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "tokenline".to_string(),
            tokens: TokenLifecycleConfig::default(),
            cleanup: CleanupConfig::default(),
            revocation: RevocationConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// Credential lifetimes and rotation behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifecycleConfig {
    /// Lifetime of access credentials.
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,

    /// Sliding window, reset on every successful rotation.
    #[serde(with = "humantime_serde")]
    pub sliding_window: Duration,

    /// Absolute ceiling of a refresh chain, fixed at first issuance.
    #[serde(with = "humantime_serde")]
    pub absolute_lifetime: Duration,

    /// Deadline applied to every store and cache call.
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Revoke the whole token family when a rotated-out credential is replayed.
    pub revoke_family_on_reuse: bool,
}

impl Default for TokenLifecycleConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(15 * 60),              // 15 minutes
            sliding_window: Duration::from_secs(30 * 24 * 3600),   // 30 days
            absolute_lifetime: Duration::from_secs(90 * 24 * 3600), // 90 days
            store_timeout: Duration::from_secs(5),
            revoke_family_on_reuse: false,
        }
    }
}

/// Cleanup scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Interval between cleanup runs.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum number of rows fetched and deleted per batch.
    pub batch_size: usize,

    /// Maximum number of batches per run; remaining rows wait for the next tick.
    pub max_batches: usize,

    /// How long revoked rows are kept for audit and replay detection.
    #[serde(with = "humantime_serde")]
    pub revocation_retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 500,
            max_batches: 20,
            revocation_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// In-process revocation cache configuration.
///
/// Only used when the shared cache is unavailable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Interval between sweeps of expired denylist entries.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Credential signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "HS256", "HS384", "HS512", "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// Shared secret for HMAC algorithms.
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// PEM private key path for RSA/EC algorithms.
    pub private_key_path: Option<String>,

    /// PEM public key path for RSA/EC algorithms.
    pub public_key_path: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: None,
            private_key_path: None,
            public_key_path: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// `sliding_window > absolute_lifetime` is accepted (the sliding window is
    /// simply moot) but logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - Any lifetime, interval or timeout is zero
    /// - The batch size or batch limit is zero
    /// - The signing algorithm is not supported
    ///
    /// Returns `ConfigError::Missing` if the key material required by the
    /// signing algorithm is absent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        let durations = [
            ("tokens.access_ttl", self.tokens.access_ttl),
            ("tokens.sliding_window", self.tokens.sliding_window),
            ("tokens.absolute_lifetime", self.tokens.absolute_lifetime),
            ("tokens.store_timeout", self.tokens.store_timeout),
            ("cleanup.interval", self.cleanup.interval),
            ("revocation.sweep_interval", self.revocation.sweep_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.cleanup.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "cleanup.batch_size must be > 0".to_string(),
            ));
        }
        if self.cleanup.max_batches == 0 {
            return Err(ConfigError::InvalidValue(
                "cleanup.max_batches must be > 0".to_string(),
            ));
        }

        if self.tokens.sliding_window > self.tokens.absolute_lifetime {
            tracing::warn!(
                sliding_window = ?self.tokens.sliding_window,
                absolute_lifetime = ?self.tokens.absolute_lifetime,
                "sliding_window exceeds absolute_lifetime; the absolute ceiling always wins"
            );
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {
                if self.signing.secret.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::Missing(
                        "signing.secret is required for HMAC algorithms".to_string(),
                    ));
                }
            }
            "RS256" | "RS384" | "ES384" => {
                if self.signing.private_key_path.is_none() || self.signing.public_key_path.is_none()
                {
                    return Err(ConfigError::Missing(
                        "signing.private_key_path and signing.public_key_path are required for RSA/EC algorithms"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS384, HS512, RS256, RS384, or ES384",
                    other
                )));
            }
        }

        Ok(())
    }
}

/// Converts a configured duration into a `time::Duration`, saturating on overflow.
#[must_use]
pub fn to_time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}
