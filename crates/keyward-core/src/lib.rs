//! Keyward Core - Secret containment substrate for the key isolation layer
//!
//! This crate provides the building blocks the HD derivation engines
//! stand on: zeroizing secret byte containers, the revocation
//! lifecycle, the error taxonomy, and derivation-path handling.

pub mod error;
pub mod path;
pub mod revocable;
pub mod secret;
pub mod types;

pub use error::{Error, Result};
pub use path::{ChildNumber, DerivationPath, HARDENED_OFFSET};
pub use revocable::Revocable;
pub use secret::SecretBytes;
pub use types::{ChainCode, MessageHash, CHAIN_CODE_LEN};
