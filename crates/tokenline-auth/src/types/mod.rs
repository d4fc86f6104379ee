//! Domain types shared by the engine and its storage backends.
//!
//! - [`RefreshTokenRecord`] - one persisted refresh credential
//! - [`ClientContext`] - device and address metadata captured at issuance
//! - [`SubjectClaims`] - current roles and account state of a subject

pub mod refresh_token;
pub mod subject;

pub use refresh_token::{ClientContext, RefreshTokenRecord};
pub use subject::SubjectClaims;
