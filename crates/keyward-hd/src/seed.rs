//! Seed container tying master-node lifecycles to the seed's own
//!
//! A [`Seed`] owns the raw entropy and hands out master nodes for
//! either curve. Revoking the seed revokes every master node it has
//! produced (and, through them, their derivation trees) before the
//! entropy itself is wiped.

use std::sync::Arc;

use tracing::debug;

use keyward_core::{Error, Result, Revocable, SecretBytes};

use crate::ed25519::Slip10Node;
use crate::secp256k1::Bip32Node;

/// Root entropy for hierarchical key derivation.
pub struct Seed {
    entropy: SecretBytes,
    lifecycle: Revocable,
}

impl Seed {
    /// Copy `entropy` into an isolated container.
    ///
    /// BIP-0032 allows seeds of 16 to 64 bytes; anything non-empty is
    /// accepted here so callers can bring non-BIP39 entropy.
    pub fn new(entropy: &[u8]) -> Result<Self> {
        if entropy.is_empty() {
            return Err(Error::InvalidKeyMaterial("empty seed".to_string()));
        }
        debug!(entropy_len = entropy.len(), "created seed");
        Ok(Self {
            entropy: SecretBytes::copy_from(entropy),
            lifecycle: Revocable::new(),
        })
    }

    /// Derive a BIP-0032 secp256k1 master node.
    ///
    /// `hmac_key` overrides the standard `"Bitcoin seed"` HMAC key for
    /// chains that fork the derivation domain.
    pub fn to_bip32_master(&self, hmac_key: Option<&[u8]>) -> Result<Arc<Bip32Node>> {
        let node = self
            .entropy
            .expose(|seed| Bip32Node::master_from_seed(seed, hmac_key))??;
        let handle = node.clone();
        self.lifecycle.add_revoker(move || handle.revoke());
        Ok(node)
    }

    /// Derive a SLIP-0010 ed25519 master node.
    pub fn to_slip10_master(&self, hmac_key: Option<&[u8]>) -> Result<Arc<Slip10Node>> {
        let node = self
            .entropy
            .expose(|seed| Slip10Node::master_from_seed(seed, hmac_key))??;
        let handle = node.clone();
        self.lifecycle.add_revoker(move || handle.revoke());
        Ok(node)
    }

    /// Revoke every master node produced so far, then wipe the entropy.
    pub fn revoke(&self) {
        if !self.lifecycle.revoke() {
            return;
        }
        self.entropy.revoke();
        debug!("revoked seed");
    }

    pub fn is_revoked(&self) -> bool {
        self.lifecycle.is_revoked()
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seed")
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}
