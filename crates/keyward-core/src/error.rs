//! Error types for the Keyward library

use thiserror::Error;

/// Result type for Keyward operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the key isolation core
#[derive(Debug, Error)]
pub enum Error {
    /// Caller attempted to extract raw secret material
    #[error("isolation violation: {0} would expose private key material")]
    IsolationViolation(&'static str),

    /// Key or chain code bytes fail range/length validation
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Operation attempted on a seed or node after its secret was zeroized
    #[error("access to revoked secret material")]
    RevokedAccess,

    /// The bounded canonical-signature retry loop was exhausted
    #[error("no canonical signature found within the retry bound")]
    CanonicalSignatureExhausted,

    /// Derivation mode not defined for the requested curve
    #[error("unsupported derivation: {0}")]
    UnsupportedDerivation(String),

    /// Derivation path string failed to parse
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    /// Failure inside an underlying cryptographic primitive
    #[error("crypto error: {0}")]
    Crypto(String),
}
