//! Storage traits for the token lifecycle engine.
//!
//! This module defines storage interfaces for:
//!
//! - Refresh token records ([`RefreshTokenStorage`])
//! - Subject identity lookups ([`SubjectDirectory`])
//!
//! # Implementations
//!
//! In-memory implementations live here. Durable backends are provided in
//! separate crates:
//!
//! - `tokenline-auth-postgres` - PostgreSQL storage backend

pub mod memory;
pub mod refresh_token;
pub mod subject;

pub use memory::InMemoryRefreshTokenStorage;
pub use refresh_token::{RefreshTokenStorage, RotationOutcome};
pub use subject::{StaticSubjectDirectory, SubjectDirectory};
