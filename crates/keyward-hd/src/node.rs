//! Scheme-dispatched node handle
//!
//! [`KeyNode`] is a cheap clonable handle over either curve's node
//! type, for callers that resolve the scheme at runtime (for example
//! from an account table). Everything dispatches by `match`; there is
//! no trait object and no way to smuggle a third scheme in.

use std::sync::Arc;

use keyward_core::{ChainCode, MessageHash, Result};

use crate::algebra::Signature;
use crate::ed25519::{Ed25519Signature, Slip10Node};
use crate::secp256k1::Bip32Node;

/// Signature scheme a node operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    /// BIP-0032 derivation, ECDSA over secp256k1
    Secp256k1,
    /// SLIP-0010 derivation, Ed25519 per RFC 8032
    Ed25519,
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secp256k1 => write!(f, "secp256k1"),
            Self::Ed25519 => write!(f, "ed25519"),
        }
    }
}

/// A derivation-tree node of either scheme.
#[derive(Clone)]
pub enum KeyNode {
    Secp256k1(Arc<Bip32Node>),
    Ed25519(Arc<Slip10Node>),
}

impl KeyNode {
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Secp256k1(_) => SignatureScheme::Secp256k1,
            Self::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }

    /// Public key in its scheme's wire encoding: 33-byte SEC1
    /// compressed for secp256k1, 32 bytes for ed25519.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Secp256k1(node) => Ok(node.public_key()?.as_bytes().to_vec()),
            Self::Ed25519(node) => Ok(node.public_key()?.as_bytes().to_vec()),
        }
    }

    pub fn chain_code(&self) -> Result<ChainCode> {
        match self {
            Self::Secp256k1(node) => node.chain_code(),
            Self::Ed25519(node) => node.chain_code(),
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Self::Secp256k1(node) => node.index(),
            Self::Ed25519(node) => node.index(),
        }
    }

    /// Derive the child at a raw index, wrapped in the same scheme.
    pub fn derive(&self, index: u32) -> Result<KeyNode> {
        match self {
            Self::Secp256k1(node) => Ok(Self::Secp256k1(node.derive(index)?)),
            Self::Ed25519(node) => Ok(Self::Ed25519(node.derive(index)?)),
        }
    }

    /// Sign `message` under the node's scheme.
    ///
    /// Secp256k1 hashes the message with SHA-256 and signs the digest
    /// canonically; ed25519 signs the raw message per RFC 8032. Both
    /// return 64 bytes.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Secp256k1(node) => Ok(node.sign(message)?.as_bytes().to_vec()),
            Self::Ed25519(node) => Ok(node.sign(message)?.as_bytes().to_vec()),
        }
    }

    /// Verify `signature` over `message` against this node's public key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            Self::Secp256k1(node) => {
                let sig = Signature::from_slice(signature)?;
                node.public_key()?.verify(&MessageHash::of(message), &sig)
            }
            Self::Ed25519(node) => {
                let sig = Ed25519Signature::from_slice(signature)?;
                node.public_key()?.verify(message, &sig)
            }
        }
    }

    pub fn revoke(&self) {
        match self {
            Self::Secp256k1(node) => node.revoke(),
            Self::Ed25519(node) => node.revoke(),
        }
    }

    pub fn is_revoked(&self) -> bool {
        match self {
            Self::Secp256k1(node) => node.is_revoked(),
            Self::Ed25519(node) => node.is_revoked(),
        }
    }
}

impl std::fmt::Debug for KeyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyNode")
            .field("scheme", &self.scheme())
            .field("index", &self.index())
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl From<Arc<Bip32Node>> for KeyNode {
    fn from(node: Arc<Bip32Node>) -> Self {
        Self::Secp256k1(node)
    }
}

impl From<Arc<Slip10Node>> for KeyNode {
    fn from(node: Arc<Slip10Node>) -> Self {
        Self::Ed25519(node)
    }
}
