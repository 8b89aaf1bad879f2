//! Wallet-facing adapter over isolated key nodes
//!
//! A [`KeyAdapter`] binds a node's public key and chain code at
//! construction, tracks its absolute derivation path, and exposes
//! wallet-shaped operations (path derivation, verification, export
//! stubs). Verification runs against the bound public key, so it works
//! even while the underlying node is mid-revocation, and export
//! surfaces fail loudly instead of leaking key material.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use keyward_core::{ChainCode, ChildNumber, DerivationPath, Error, MessageHash, Result};

use crate::algebra::{CompressedPoint, Signature};
use crate::ed25519::Ed25519PublicKey;
use crate::ed25519::Ed25519Signature;
use crate::node::{KeyNode, SignatureScheme};

/// Adapter over a [`KeyNode`], carrying bound public material and the
/// node's absolute path from its master.
pub struct KeyAdapter {
    node: KeyNode,
    public_key: Vec<u8>,
    chain_code: ChainCode,
    path: DerivationPath,
    parent: Option<Weak<KeyAdapter>>,
    children: Mutex<BTreeMap<u32, Arc<KeyAdapter>>>,
}

impl KeyAdapter {
    /// Wrap a master node, snapshotting its public key and chain code.
    pub fn create(node: KeyNode) -> Result<Arc<Self>> {
        Self::bind(node, DerivationPath::master(), None)
    }

    fn bind(
        node: KeyNode,
        path: DerivationPath,
        parent: Option<Weak<KeyAdapter>>,
    ) -> Result<Arc<Self>> {
        let public_key = node.public_key_bytes()?;
        let chain_code = node.chain_code()?;
        Ok(Arc::new(Self {
            node,
            public_key,
            chain_code,
            path,
            parent,
            children: Mutex::new(BTreeMap::new()),
        }))
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.node.scheme()
    }

    /// Public key bytes bound at construction.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Chain code bound at construction.
    pub fn chain_code(&self) -> &ChainCode {
        &self.chain_code
    }

    /// Raw child index of the underlying node.
    pub fn index(&self) -> u32 {
        self.node.index()
    }

    /// True for the adapter wrapped directly around a master node.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Absolute path from the master, rendered as `m/44'/0'/0`.
    pub fn path(&self) -> String {
        self.path.to_string()
    }

    /// Derive (and memoize) the child adapter at a raw index.
    pub fn derive(self: &Arc<Self>, index: u32) -> Result<Arc<KeyAdapter>> {
        let mut children = self.children.lock().expect("children lock poisoned");
        if let Some(child) = children.get(&index) {
            return Ok(child.clone());
        }
        trace!(index, path = %self.path, "deriving child adapter");
        let node = self.node.derive(index)?;
        let path = self.path.child(ChildNumber::from_raw(index));
        let child = Self::bind(node, path, Some(Arc::downgrade(self)))?;
        children.insert(index, child.clone());
        Ok(child)
    }

    /// Derive the hardened child for a plain index below 2^31.
    pub fn derive_hardened(self: &Arc<Self>, index: u32) -> Result<Arc<KeyAdapter>> {
        self.derive(ChildNumber::hardened(index)?.raw())
    }

    /// Resolve a derivation path string to an adapter.
    ///
    /// Absolute paths (`m/...`) are accepted on any adapter whose own
    /// path is a prefix of the request; the shared prefix is stripped
    /// and only the remainder is derived. Relative paths (`44'/0'`)
    /// derive from this adapter directly. Resolving an adapter's own
    /// absolute path returns `self`.
    pub fn derive_path(self: &Arc<Self>, path: &str) -> Result<Arc<KeyAdapter>> {
        let own = self.path();
        if path == own {
            return Ok(self.clone());
        }
        // Strip exactly this adapter's own prefix; the remainder goes
        // through the strict parser untouched, so malformed shapes like
        // empty segments still fail.
        let relative = if path == "m" || path.starts_with("m/") {
            let prefix = format!("{}/", own);
            path.strip_prefix(&prefix).ok_or_else(|| {
                Error::InvalidPath(format!(
                    "absolute path {} does not extend this node's path {}",
                    path, own
                ))
            })?
        } else {
            path
        };
        let parsed = DerivationPath::from_str(relative)?;
        let mut current = self.clone();
        for component in parsed.iter() {
            current = current.derive(component.raw())?;
        }
        Ok(current)
    }

    /// Sign `message` with the underlying node.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.node.sign(message)
    }

    /// Verify a signature against the bound public key.
    ///
    /// Never consults the node, so a revoked tree can still verify
    /// signatures it produced earlier.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self.node.scheme() {
            SignatureScheme::Secp256k1 => {
                let point = CompressedPoint::from_slice(&self.public_key)?;
                point.verify(&MessageHash::of(message), &Signature::from_slice(signature)?)
            }
            SignatureScheme::Ed25519 => {
                let point = Ed25519PublicKey::from_slice(&self.public_key)?;
                point.verify(message, &Ed25519Signature::from_slice(signature)?)
            }
        }
    }

    /// WIF export would serialize the private key; always refused.
    pub fn to_wif(&self) -> Result<String> {
        Err(Error::IsolationViolation("WIF"))
    }

    /// Raw private key export; always refused.
    pub fn export_private_key(&self) -> Result<Vec<u8>> {
        Err(Error::IsolationViolation("private key export"))
    }

    /// Revoke the underlying node (and its derivation subtree).
    pub fn revoke(&self) {
        self.node.revoke();
    }

    pub fn is_revoked(&self) -> bool {
        self.node.is_revoked()
    }
}

impl std::fmt::Debug for KeyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAdapter")
            .field("scheme", &self.scheme())
            .field("path", &self.path())
            .field("public_key", &hex::encode(&self.public_key))
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::Slip10Node;
    use crate::secp256k1::Bip32Node;
    use keyward_core::HARDENED_OFFSET;

    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn secp_root() -> Arc<KeyAdapter> {
        let seed = hex::decode(TV1_SEED).unwrap();
        let master = Bip32Node::master_from_seed(&seed, None).unwrap();
        KeyAdapter::create(KeyNode::from(master)).unwrap()
    }

    fn ed_root() -> Arc<KeyAdapter> {
        let seed = hex::decode(TV1_SEED).unwrap();
        let master = Slip10Node::master_from_seed(&seed, None).unwrap();
        KeyAdapter::create(KeyNode::from(master)).unwrap()
    }

    #[test]
    fn test_root_path_rendering() {
        let root = secp_root();
        assert!(root.is_root());
        assert_eq!(root.path(), "m");
        let child = root.derive_hardened(0).unwrap();
        assert_eq!(child.path(), "m/0'");
        assert!(!child.is_root());
        let grandchild = child.derive(1).unwrap();
        assert_eq!(grandchild.path(), "m/0'/1");
    }

    #[test]
    fn test_derive_path_absolute_and_relative() {
        let root = secp_root();
        let a = root.derive_path("m/0'/1/2'").unwrap();
        assert_eq!(a.path(), "m/0'/1/2'");

        let b = root
            .derive_hardened(0)
            .unwrap()
            .derive(1)
            .unwrap()
            .derive_hardened(2)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // relative resolution from an interior node
        let interior = root.derive_path("m/0'").unwrap();
        let c = interior.derive_path("1/2'").unwrap();
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_derive_path_prefix_stripping() {
        let root = secp_root();
        let interior = root.derive_path("m/0'/1").unwrap();
        // absolute path through an interior adapter strips the shared prefix
        let a = interior.derive_path("m/0'/1/2'").unwrap();
        assert_eq!(a.path(), "m/0'/1/2'");
        // own absolute path resolves to self
        let same = interior.derive_path("m/0'/1").unwrap();
        assert!(Arc::ptr_eq(&interior, &same));
        // a non-extending absolute path is an error
        assert!(matches!(
            interior.derive_path("m/44'/0'"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_derive_path_memoizes() {
        let root = secp_root();
        let a = root.derive_path("m/0'/1").unwrap();
        let b = root.derive_path("m/0'/1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bad_paths_rejected() {
        let root = secp_root();
        // empty segments must reach the parser, not be swallowed
        assert!(root.derive_path("m//0").is_err());
        assert!(root.derive_path("m/").is_err());
        assert!(root.derive_path("m/0'//1").is_err());
        assert!(root.derive_path("m/x").is_err());
        assert!(root.derive_path("0/m").is_err());
        assert!(root.derive_path("m/2147483648").is_err());

        let interior = root.derive_path("m/0'").unwrap();
        assert!(interior.derive_path("m/0'/").is_err());
        assert!(interior.derive_path("m/0'//1").is_err());
    }

    #[test]
    fn test_sign_and_verify_bound_key() {
        for root in [secp_root(), ed_root()] {
            let adapter = root.derive(HARDENED_OFFSET).unwrap();
            let message = b"adapter signing test";
            let sig = adapter.sign(message).unwrap();
            adapter.verify(message, &sig).unwrap();
            assert!(adapter.verify(b"other", &sig).is_err());
        }
    }

    #[test]
    fn test_verify_survives_revocation() {
        let root = secp_root();
        let message = b"signed before revocation";
        let sig = root.sign(message).unwrap();
        root.revoke();
        assert!(root.is_revoked());
        assert!(root.sign(message).is_err());
        // the bound public key still verifies the earlier signature
        root.verify(message, &sig).unwrap();
    }

    #[test]
    fn test_exports_refused() {
        let root = secp_root();
        assert!(matches!(root.to_wif(), Err(Error::IsolationViolation(_))));
        assert!(matches!(
            root.export_private_key(),
            Err(Error::IsolationViolation(_))
        ));
    }

    #[test]
    fn test_ed25519_adapter_hardened_only() {
        let root = ed_root();
        assert!(root.derive_path("m/44'/4218'").is_ok());
        assert!(matches!(
            root.derive_path("m/44'/0"),
            Err(Error::UnsupportedDerivation(_))
        ));
    }
}
