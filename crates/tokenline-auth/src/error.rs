//! Token lifecycle error types.
//!
//! This module defines every error the rotation engine, the access gate and
//! the storage backends can surface to callers.
//!
//! # Caller-visible behavior
//!
//! `InvalidOrRevoked`, `Expired`, `MalformedCredential` and `SubjectInactive`
//! all mean "discard both credentials and re-authenticate". They share the same
//! public code so a client cannot tell an unknown credential from a revoked one.
//! `StoreUnavailable` is the only retryable failure.

use std::fmt;

/// Which expiry horizon rejected a refresh credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryHorizon {
    /// The sliding window (reset on every rotation) has elapsed.
    Sliding,
    /// The absolute ceiling (fixed for the whole chain) has elapsed.
    Absolute,
    /// Both horizons have elapsed.
    Both,
    /// The expiry embedded in the signed credential itself has elapsed.
    Credential,
}

impl ExpiryHorizon {
    /// Determines which horizon was crossed, if any.
    #[must_use]
    pub fn crossed(sliding_expired: bool, absolute_expired: bool) -> Option<Self> {
        match (sliding_expired, absolute_expired) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Sliding),
            (false, true) => Some(Self::Absolute),
            (false, false) => None,
        }
    }

    /// Returns the horizon name as used in log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sliding => "sliding",
            Self::Absolute => "absolute",
            Self::Both => "sliding+absolute",
            Self::Credential => "credential",
        }
    }
}

impl fmt::Display for ExpiryHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during token lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The presented refresh credential is not live in the store
    /// (unknown, already rotated, or explicitly revoked).
    #[error("Refresh credential is invalid or revoked")]
    InvalidOrRevoked,

    /// The refresh credential was found but is past one of its horizons.
    ///
    /// The horizon is kept for logging only; it is not part of the message.
    #[error("Refresh credential expired")]
    Expired {
        /// Which horizon rejected the credential.
        horizon: ExpiryHorizon,
    },

    /// The credential failed signature or structure verification.
    #[error("Malformed credential: {message}")]
    MalformedCredential {
        /// Description of the verification failure.
        message: String,
    },

    /// The owning subject is unknown, disabled or locked.
    #[error("Subject is not allowed to hold a session: {subject_id}")]
    SubjectInactive {
        /// The rejected subject.
        subject_id: String,
    },

    /// A store or cache call failed or timed out.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the infrastructure failure.
        message: String,
    },

    /// The lifecycle configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Expired` error.
    #[must_use]
    pub fn expired(horizon: ExpiryHorizon) -> Self {
        Self::Expired { horizon }
    }

    /// Creates a new `MalformedCredential` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCredential {
            message: message.into(),
        }
    }

    /// Creates a new `SubjectInactive` error.
    #[must_use]
    pub fn subject_inactive(subject_id: impl Into<String>) -> Self {
        Self::SubjectInactive {
            subject_id: subject_id.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller must discard its credentials and log in again.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrRevoked
                | Self::Expired { .. }
                | Self::MalformedCredential { .. }
                | Self::SubjectInactive { .. }
        )
    }

    /// Returns `true` if the failure is transient and the call may be retried
    /// with the same credential.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.requires_reauthentication()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidOrRevoked => ErrorCategory::Credential,
            Self::Expired { .. } => ErrorCategory::Credential,
            Self::MalformedCredential { .. } => ErrorCategory::Credential,
            Self::SubjectInactive { .. } => ErrorCategory::Subject,
            Self::StoreUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the code exposed to callers.
    ///
    /// Every re-authentication kind collapses to `invalid_grant`.
    #[must_use]
    pub fn public_code(&self) -> &'static str {
        match self {
            Self::InvalidOrRevoked
            | Self::Expired { .. }
            | Self::MalformedCredential { .. }
            | Self::SubjectInactive { .. } => "invalid_grant",
            Self::StoreUnavailable { .. } => "temporarily_unavailable",
            Self::Configuration { .. } | Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of lifecycle errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The presented credential was rejected.
    Credential,
    /// The owning subject was rejected.
    Subject,
    /// Store or cache failure.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Subject => write!(f, "subject"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
