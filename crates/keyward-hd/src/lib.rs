//! Hierarchical deterministic key derivation over isolated secrets
//!
//! This crate builds derivation trees on top of the `keyward-core`
//! isolation primitives:
//!
//! - [`secp256k1`]: BIP-0032 nodes with canonical ECDSA signing
//! - [`ed25519`]: SLIP-0010 hardened-only nodes signing per RFC 8032
//! - [`seed`]: root entropy producing master nodes for either curve
//! - [`node`]: a scheme-dispatched handle over both node types
//! - [`adapter`]: wallet-facing path resolution and verification
//!
//! Private keys live in [`keyward_core::SecretBytes`] containers and
//! never cross an API boundary; signing and derivation happen inside
//! the node, and revoking a seed or node wipes its whole subtree.

pub mod adapter;
pub mod algebra;
pub mod ed25519;
pub mod node;
pub mod secp256k1;
pub mod seed;

pub use adapter::KeyAdapter;
pub use algebra::{
    is_valid_field_element, points_equal, CompressedPoint, FieldElement, RecoverableSignature,
    Signature, UncompressedPoint, CURVE_ORDER, CURVE_ORDER_HALF,
};
pub use ed25519::{Ed25519PublicKey, Ed25519Signature, Slip10Node, SLIP10_MASTER_HMAC_KEY};
pub use node::{KeyNode, SignatureScheme};
pub use secp256k1::{Bip32Node, BIP32_MASTER_HMAC_KEY};
pub use seed::Seed;

/// Upper bound on RFC 6979 re-randomization rounds while hunting for a
/// canonical (low-s, low-r, recoverable) ECDSA signature. Each round
/// succeeds independently with probability ~1/2, so 128 rounds failing
/// indicates a broken RNG construction rather than bad luck.
pub const MAX_SIGNING_ATTEMPTS: u32 = 128;
