//! SLIP-0010 hierarchical derivation over Ed25519
//!
//! Ed25519 has no defined non-hardened derivation, so a [`Slip10Node`]
//! only derives hardened children. Private keys are opaque 32-byte
//! seeds (no scalar arithmetic); the audited `ed25519-dalek` primitive
//! handles key generation, signing, and verification.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha512;
use tracing::{debug, trace};
use zeroize::Zeroize;

use keyward_core::types::hex_bytes_32;
use keyward_core::{
    ChainCode, ChildNumber, Error, Result, Revocable, SecretBytes, HARDENED_OFFSET,
};

type HmacSha512 = Hmac<Sha512>;

/// Default HMAC key for master-key derivation, per SLIP-0010
pub const SLIP10_MASTER_HMAC_KEY: &[u8] = b"ed25519 seed";

/// Raw Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519PublicKey(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

impl Ed25519PublicKey {
    /// Validate the bytes as a curve point and wrap them.
    pub fn new(bytes: [u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| Error::InvalidKeyMaterial("bytes are not an ed25519 point".to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!(
                "ed25519 public key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature over `message`.
    ///
    /// Pure function of the public key; never touches secret material.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| Error::Crypto(format!("invalid public key: {}", e)))?;
        let sig = DalekSignature::from_bytes(signature.as_bytes());
        verifying_key
            .verify(message, &sig)
            .map_err(|_| Error::Crypto("signature verification failed".to_string()))
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Ed25519 signature (64 bytes: R || S)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!("signature must be 64 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(&s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// One node of a SLIP-0010 Ed25519 derivation tree
pub struct Slip10Node {
    secret: SecretBytes,
    chain_code: ChainCode,
    index: u32,
    public_key: OnceLock<Ed25519PublicKey>,
    children: Mutex<BTreeMap<u32, Arc<Slip10Node>>>,
    lifecycle: Revocable,
}

impl Slip10Node {
    fn new(private_key: &[u8], chain_code: ChainCode, index: u32) -> Result<Arc<Self>> {
        if private_key.len() != 32 {
            return Err(Error::InvalidKeyMaterial(format!(
                "ed25519 private key must be 32 bytes, got {}",
                private_key.len()
            )));
        }
        Ok(Arc::new(Self {
            secret: SecretBytes::copy_from(private_key),
            chain_code,
            index,
            public_key: OnceLock::new(),
            children: Mutex::new(BTreeMap::new()),
            lifecycle: Revocable::new(),
        }))
    }

    /// Derive the master node from a seed.
    ///
    /// HMAC-SHA512 keyed by `"ed25519 seed"` (or `hmac_key`) over the
    /// seed bytes; left half is the master secret, right half the
    /// chain code.
    pub fn master_from_seed(seed: &[u8], hmac_key: Option<&[u8]>) -> Result<Arc<Self>> {
        if seed.is_empty() {
            return Err(Error::InvalidKeyMaterial("empty seed".to_string()));
        }
        let mut mac = HmacSha512::new_from_slice(hmac_key.unwrap_or(SLIP10_MASTER_HMAC_KEY))
            .map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(seed);
        let digest = mac.finalize().into_bytes();

        let mut il = [0u8; 32];
        il.copy_from_slice(&digest[..32]);
        let chain_code = ChainCode::from_slice(&digest[32..])?;

        debug!(seed_len = seed.len(), "derived slip10 master key");
        let node = Self::new(&il, chain_code, 0);
        il.zeroize();
        node
    }

    /// The raw child index this node was derived at (0 for the master).
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The node's chain code.
    pub fn chain_code(&self) -> Result<ChainCode> {
        if self.is_revoked() {
            return Err(Error::RevokedAccess);
        }
        Ok(self.chain_code)
    }

    /// The 32-byte public key, memoized after first computation.
    ///
    /// Key generation is a deterministic one-way function of the
    /// private key, which never changes after construction.
    pub fn public_key(&self) -> Result<Ed25519PublicKey> {
        if self.is_revoked() {
            return Err(Error::RevokedAccess);
        }
        if let Some(pk) = self.public_key.get() {
            return Ok(*pk);
        }
        let pk = self.compute_public_key()?;
        Ok(*self.public_key.get_or_init(|| pk))
    }

    fn compute_public_key(&self) -> Result<Ed25519PublicKey> {
        self.secret.expose(|sk| {
            let mut seed: [u8; 32] = sk.try_into().expect("secret is 32 bytes");
            let signing_key = SigningKey::from_bytes(&seed);
            seed.zeroize();
            Ed25519PublicKey::new(signing_key.verifying_key().to_bytes())
        })?
    }

    /// Derive (and memoize) the hardened child at a raw `index`.
    ///
    /// The index must already carry the hardening offset; Ed25519 has
    /// no non-hardened derivation, and asking for one fails with
    /// [`Error::UnsupportedDerivation`] rather than being silently
    /// upgraded. Use [`Slip10Node::derive_hardened`] to pass a plain
    /// index.
    pub fn derive(self: &Arc<Self>, index: u32) -> Result<Arc<Slip10Node>> {
        if index < HARDENED_OFFSET {
            return Err(Error::UnsupportedDerivation(format!(
                "ed25519 nodes only derive hardened children (index {})",
                index
            )));
        }
        let mut children = self.children.lock().expect("children lock poisoned");
        if self.is_revoked() {
            return Err(Error::RevokedAccess);
        }
        if let Some(child) = children.get(&index) {
            return Ok(child.clone());
        }
        let child = self.derive_uncached(index)?;
        children.insert(index, child.clone());
        Ok(child)
    }

    /// Derive the hardened child for a plain index below 2^31.
    pub fn derive_hardened(self: &Arc<Self>, index: u32) -> Result<Arc<Slip10Node>> {
        self.derive(ChildNumber::hardened(index)?.raw())
    }

    fn derive_uncached(&self, index: u32) -> Result<Arc<Slip10Node>> {
        trace!(index, "deriving slip10 child");
        let mut mac = HmacSha512::new_from_slice(self.chain_code.as_bytes())
            .map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(&[0x00]);
        self.secret.expose(|sk| mac.update(sk))?;
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        // Left half is the child key directly; ed25519 keys are opaque
        // seeds, not scalars under addition.
        let mut il = [0u8; 32];
        il.copy_from_slice(&digest[..32]);
        let chain_code = ChainCode::from_slice(&digest[32..])?;
        let node = Slip10Node::new(&il, chain_code, index);
        il.zeroize();
        node
    }

    /// Sign `message` per RFC 8032.
    pub fn sign(&self, message: &[u8]) -> Result<Ed25519Signature> {
        self.secret.expose(|sk| {
            let mut seed: [u8; 32] = sk.try_into().expect("secret is 32 bytes");
            let signing_key = SigningKey::from_bytes(&seed);
            seed.zeroize();
            Ed25519Signature::new(signing_key.sign(message).to_bytes())
        })
    }

    /// Raw-key export is a deliberate capability hole.
    pub fn export_private_key(&self) -> Result<Vec<u8>> {
        Err(Error::IsolationViolation("private key export"))
    }

    /// Register a cleanup callback on this node's revocation chain.
    pub fn add_revoker(&self, f: impl FnOnce() + Send + 'static) {
        self.lifecycle.add_revoker(f);
    }

    /// Zeroize this node's secret and revoke every memoized child.
    pub fn revoke(&self) {
        if !self.lifecycle.revoke() {
            return;
        }
        let children = {
            let mut children = self.children.lock().expect("children lock poisoned");
            std::mem::take(&mut *children)
        };
        for child in children.values() {
            child.revoke();
        }
        self.secret.revoke();
        debug!(index = self.index, "revoked slip10 node");
    }

    pub fn is_revoked(&self) -> bool {
        self.lifecycle.is_revoked()
    }
}

impl std::fmt::Debug for Slip10Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slip10Node")
            .field("index", &self.index)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SLIP-0010 test vector 1 for ed25519,
    // seed 000102030405060708090a0b0c0d0e0f
    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const TV1_MASTER_CHAIN: &str =
        "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb";
    const TV1_MASTER_PUB: &str =
        "a4b2856bfec510abab89753fac1ac0e1112364e7d250545963f135f2a33188ed";
    const TV1_M0H_CHAIN: &str =
        "8b59aa11380b624e81507a27fedda59fea6d0b779a778918a2fd3590e16e9c69";
    const TV1_M0H_PUB: &str =
        "8c8a13df77a28f3445213a0f432fde644acaa215fc72dcdf300d5efaa85d350c";

    fn tv1_master() -> Arc<Slip10Node> {
        let seed = hex::decode(TV1_SEED).unwrap();
        Slip10Node::master_from_seed(&seed, None).unwrap()
    }

    #[test]
    fn test_master_from_seed_vector() {
        let master = tv1_master();
        assert_eq!(master.chain_code().unwrap().to_hex(), TV1_MASTER_CHAIN);
        assert_eq!(master.public_key().unwrap().to_hex(), TV1_MASTER_PUB);
    }

    #[test]
    fn test_hardened_derivation_vector() {
        let master = tv1_master();
        let child = master.derive_hardened(0).unwrap();
        assert_eq!(child.chain_code().unwrap().to_hex(), TV1_M0H_CHAIN);
        assert_eq!(child.public_key().unwrap().to_hex(), TV1_M0H_PUB);
        assert_eq!(child.index(), HARDENED_OFFSET);
    }

    #[test]
    fn test_non_hardened_derivation_rejected() {
        let master = tv1_master();
        assert!(matches!(
            master.derive(0),
            Err(Error::UnsupportedDerivation(_))
        ));
        assert!(matches!(
            master.derive(HARDENED_OFFSET - 1),
            Err(Error::UnsupportedDerivation(_))
        ));
        // The node stays usable after the failed call
        assert!(master.derive(HARDENED_OFFSET).is_ok());
    }

    #[test]
    fn test_derive_hardened_range_check() {
        let master = tv1_master();
        assert!(master.derive_hardened(HARDENED_OFFSET).is_err());
        assert!(master.derive_hardened(HARDENED_OFFSET - 1).is_ok());
    }

    #[test]
    fn test_derivation_is_memoized() {
        let master = tv1_master();
        let a = master.derive_hardened(7).unwrap();
        let b = master.derive(7 | HARDENED_OFFSET).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_sign_and_verify() {
        let master = tv1_master();
        let message = b"keyward slip10 signing test";
        let sig = master.sign(message).unwrap();
        let pk = master.public_key().unwrap();
        pk.verify(message, &sig).unwrap();
        assert!(pk.verify(b"different message", &sig).is_err());

        // RFC 8032 signatures are deterministic
        assert_eq!(master.sign(message).unwrap(), sig);
    }

    #[test]
    fn test_export_fails_with_isolation_error() {
        let master = tv1_master();
        assert!(matches!(
            master.export_private_key(),
            Err(Error::IsolationViolation(_))
        ));
    }

    #[test]
    fn test_revoke_cascades_and_blocks() {
        let master = tv1_master();
        let child = master.derive_hardened(0).unwrap();
        master.revoke();
        assert!(child.is_revoked());
        assert!(matches!(master.public_key(), Err(Error::RevokedAccess)));
        assert!(matches!(child.sign(b"x"), Err(Error::RevokedAccess)));
        assert!(matches!(
            master.derive_hardened(1),
            Err(Error::RevokedAccess)
        ));
    }
}
