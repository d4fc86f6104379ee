//! # tokenline-auth
//!
//! Refresh token lifecycle engine.
//!
//! This crate provides:
//! - Signed access and refresh credentials with an explicit kind claim
//! - Atomic refresh token rotation with sliding and absolute expiry
//! - Terminal revocation (single, per subject, per family) and logout
//! - A TTL-bounded denylist for access credentials
//! - Batched garbage collection of expired and long-revoked records
//!
//! ## Modules
//!
//! - [`config`] - Lifecycle, cleanup and signing configuration
//! - [`clock`] - Injectable time source
//! - [`token`] - Credential codec and lookup hashing
//! - [`types`] - Refresh token record and subject claims
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`rotation`] - The rotation engine and access gate
//! - [`revocation`] - Access credential denylist
//! - [`cleanup`] - Periodic store cleanup
//!
//! ## Example
//!
//! ```ignore
//! use tokenline_auth::prelude::*;
//!
//! let pair = service.issue_initial("user-1", ClientContext::default()).await?;
//! let next = service.refresh(&pair.refresh_token, ClientContext::default()).await?;
//! let claims = service.authenticate(&next.access_token).await?;
//! ```

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod revocation;
pub mod rotation;
pub mod storage;
pub mod token;
pub mod types;

pub use cleanup::{CleanupReport, CleanupScheduler};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use config::{
    AuthConfig, CleanupConfig, ConfigError, RevocationConfig, SigningConfig, TokenLifecycleConfig,
};
pub use error::{AuthError, ErrorCategory, ExpiryHorizon};
pub use revocation::{DynRevocationCache, InMemoryRevocationCache, RevocationCache};
pub use rotation::{LogoutOutcome, RotationService, TokenPair};
pub use storage::{
    InMemoryRefreshTokenStorage, RefreshTokenStorage, RotationOutcome, StaticSubjectDirectory,
    SubjectDirectory,
};
pub use token::{
    CodecError, CredentialClaims, SigningAlgorithm, SigningKey, TokenCodec, TokenKind, hash_token,
};
pub use types::{ClientContext, RefreshTokenRecord, SubjectClaims};

/// Type alias for token lifecycle results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokenline_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::cleanup::{CleanupReport, CleanupScheduler};
    pub use crate::clock::{Clock, DynClock, SystemClock};
    pub use crate::config::AuthConfig;
    pub use crate::error::{AuthError, ErrorCategory, ExpiryHorizon};
    pub use crate::revocation::{DynRevocationCache, RevocationCache};
    pub use crate::rotation::{LogoutOutcome, RotationService, TokenPair};
    pub use crate::storage::{RefreshTokenStorage, SubjectDirectory};
    pub use crate::token::{TokenCodec, TokenKind};
    pub use crate::types::{ClientContext, RefreshTokenRecord, SubjectClaims};
}
