//! Credential minting, verification and hashing.
//!
//! - [`jwt`] signs and verifies access and refresh credentials
//! - [`hash`] derives the store lookup key from a raw credential

pub mod hash;
pub mod jwt;

pub use hash::hash_token;
pub use jwt::{
    CodecError, CredentialClaims, IssuedCredential, SigningAlgorithm, SigningKey, TokenCodec,
    TokenKind,
};
