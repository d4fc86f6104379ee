//! Composition root for the tokenline refresh token engine.
//!
//! Loads configuration, selects the storage and revocation backends, wires
//! the rotation engine and runs the background maintenance tasks until
//! shutdown.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, PostgresConfig, StorageBackend, StorageConfig};
pub use server::{ServerBuilder, Stores, TokenlineServer};

/// Build identifier embedded at compile time.
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
