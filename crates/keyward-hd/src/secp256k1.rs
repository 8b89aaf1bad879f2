//! BIP32 hierarchical derivation over secp256k1
//!
//! A [`Bip32Node`] owns one point of a derivation tree: a private
//! scalar held in a [`SecretBytes`] container, the 32-byte chain code,
//! and a memoized map of derived children. The scalar never leaves the
//! node; callers get the compressed public key, canonical signatures,
//! and further nodes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use hmac::{Hmac, Mac};
use k256::ecdsa::hazmat::SignPrimitive;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{ProjectivePoint, Scalar};
use sha2::{Sha256, Sha512};
use tracing::{debug, trace};
use zeroize::Zeroize;

use keyward_core::{
    ChainCode, Error, MessageHash, Result, Revocable, SecretBytes, HARDENED_OFFSET,
};

use crate::algebra::{CompressedPoint, RecoverableSignature, Signature};
use crate::MAX_SIGNING_ATTEMPTS;

type HmacSha512 = Hmac<Sha512>;

/// Default HMAC key for master-key derivation, per BIP32
pub const BIP32_MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// One node of a BIP32 secp256k1 derivation tree
pub struct Bip32Node {
    secret: SecretBytes,
    chain_code: ChainCode,
    index: u32,
    public_key: OnceLock<CompressedPoint>,
    children: Mutex<BTreeMap<u32, Arc<Bip32Node>>>,
    lifecycle: Revocable,
}

impl Bip32Node {
    fn new(private_key: &[u8; 32], chain_code: ChainCode, index: u32) -> Result<Arc<Self>> {
        if !crate::algebra::is_valid_field_element(private_key) {
            return Err(Error::InvalidKeyMaterial(
                "derived key out of range for secp256k1".to_string(),
            ));
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
    /// HMAC-SHA512 keyed by `"Bitcoin seed"` (or `hmac_key` when a
    /// caller needs a non-Bitcoin tree) over the seed bytes; the left
    /// half becomes the master secret, the right half the chain code.
    pub fn master_from_seed(seed: &[u8], hmac_key: Option<&[u8]>) -> Result<Arc<Self>> {
        if seed.is_empty() {
            return Err(Error::InvalidKeyMaterial("empty seed".to_string()));
        }
        let mut mac = HmacSha512::new_from_slice(hmac_key.unwrap_or(BIP32_MASTER_HMAC_KEY))
            .map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(seed);
        let digest = mac.finalize().into_bytes();

        let mut il = [0u8; 32];
        il.copy_from_slice(&digest[..32]);
        let chain_code = ChainCode::from_slice(&digest[32..])?;

        debug!(seed_len = seed.len(), "derived bip32 master key");
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

    /// The 33-byte compressed public key, cached after first use.
    pub fn public_key(&self) -> Result<CompressedPoint> {
        if self.is_revoked() {
            return Err(Error::RevokedAccess);
        }
        if let Some(pk) = self.public_key.get() {
            return Ok(*pk);
        }
        let pk = self.compute_public_key()?;
        Ok(*self.public_key.get_or_init(|| pk))
    }

    fn compute_public_key(&self) -> Result<CompressedPoint> {
        let scalar = self.secret_scalar()?;
        let point = (ProjectivePoint::GENERATOR * scalar).to_affine();
        let encoded = point.to_encoded_point(true);
        CompressedPoint::from_slice(encoded.as_bytes())
    }

    fn secret_scalar(&self) -> Result<Scalar> {
        self.secret.expose(|sk| {
            let arr: [u8; 32] = sk.try_into().expect("secret is 32 bytes");
            Option::<Scalar>::from(Scalar::from_repr(arr.into()))
                .ok_or_else(|| Error::InvalidKeyMaterial("stored scalar out of range".to_string()))
        })?
    }

    /// Derive (and memoize) the child at `index`.
    ///
    /// Indices at or above [`HARDENED_OFFSET`] select hardened
    /// derivation, which feeds the private key into the HMAC; lower
    /// indices feed only the compressed public key. Repeated calls
    /// with the same index return the same node.
    pub fn derive(self: &Arc<Self>, index: u32) -> Result<Arc<Bip32Node>> {
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

    fn derive_uncached(&self, index: u32) -> Result<Arc<Bip32Node>> {
        let parent_scalar = self.secret_scalar()?;

        // The BIP32 edge case: if IL is not a valid scalar, or the
        // child key is zero, skip to the next index.
        let mut effective = index;
        loop {
            trace!(
                index = effective,
                hardened = effective >= HARDENED_OFFSET,
                "deriving bip32 child"
            );
            let mut mac = HmacSha512::new_from_slice(self.chain_code.as_bytes())
                .map_err(|e| Error::Crypto(e.to_string()))?;
            if effective >= HARDENED_OFFSET {
                mac.update(&[0x00]);
                self.secret.expose(|sk| mac.update(sk))?;
            } else {
                let parent_pub = self.public_key()?;
                mac.update(parent_pub.as_bytes());
            }
            mac.update(&effective.to_be_bytes());
            let digest = mac.finalize().into_bytes();

            let mut il = [0u8; 32];
            il.copy_from_slice(&digest[..32]);
            let tweak = Option::<Scalar>::from(Scalar::from_repr(il.into()));
            il.zeroize();

            if let Some(tweak) = tweak {
                let child_scalar = parent_scalar + tweak;
                if !bool::from(child_scalar.is_zero()) {
                    let mut child_key: [u8; 32] = child_scalar.to_bytes().into();
                    let chain_code = ChainCode::from_slice(&digest[32..])?;
                    let node = Bip32Node::new(&child_key, chain_code, effective);
                    child_key.zeroize();
                    return node;
                }
            }
            effective = effective
                .checked_add(1)
                .ok_or_else(|| Error::Crypto("derivation index space exhausted".to_string()))?;
        }
    }

    /// Sign a 32-byte prehash, producing a canonical signature.
    ///
    /// Deterministic RFC6979 with an extra-entropy counter 0,1,2,…;
    /// the first attempt whose signature is canonical (low-S, low-R,
    /// recovery parameter in {0,1}) wins. Exhausting the bound means a
    /// broken implementation, not bad luck, and fails hard.
    pub fn sign_prehashed(&self, hash: &MessageHash) -> Result<Signature> {
        Ok(self.sign_canonical(hash)?.signature)
    }

    /// Sign a 32-byte prehash and keep the recovery parameter.
    pub fn sign_recoverable(&self, hash: &MessageHash) -> Result<RecoverableSignature> {
        self.sign_canonical(hash)
    }

    /// SHA-256 the message and sign the digest.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        self.sign_prehashed(&MessageHash::of(message))
    }

    fn sign_canonical(&self, hash: &MessageHash) -> Result<RecoverableSignature> {
        let scalar = self.secret_scalar()?;
        let z = k256::FieldBytes::from(*hash.as_bytes());
        for counter in 0..MAX_SIGNING_ATTEMPTS {
            let mut ad = [0u8; 32];
            ad[..4].copy_from_slice(&counter.to_le_bytes());
            let (sig, recid) = scalar
                .try_sign_prehashed_rfc6979::<Sha256>(&z, &ad)
                .map_err(|e| Error::Crypto(format!("ecdsa signing failed: {}", e)))?;
            let recovery_id = recid
                .ok_or_else(|| Error::Crypto("signer produced no recovery id".to_string()))?
                .to_byte();
            let candidate =
                RecoverableSignature::new(Signature::from_slice(&sig.to_bytes())?, recovery_id);
            if candidate.is_canonical() {
                trace!(attempts = counter + 1, "produced canonical signature");
                return Ok(candidate);
            }
        }
        Err(Error::CanonicalSignatureExhausted)
    }

    /// Extended-private-key export is a deliberate capability hole.
    pub fn export_xprv(&self) -> Result<String> {
        Err(Error::IsolationViolation("xprv"))
    }

    /// WIF export is a deliberate capability hole.
    pub fn export_wif(&self) -> Result<String> {
        Err(Error::IsolationViolation("WIF"))
    }

    /// Register a cleanup callback on this node's revocation chain.
    pub fn add_revoker(&self, f: impl FnOnce() + Send + 'static) {
        self.lifecycle.add_revoker(f);
    }

    /// Zeroize this node's secret and revoke every memoized child.
    ///
    /// Children go first so no child outlives the wiping of material
    /// it was derived from. Idempotent.
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
        debug!(index = self.index, "revoked bip32 node");
    }

    pub fn is_revoked(&self) -> bool {
        self.lifecycle.is_revoked()
    }
}

impl std::fmt::Debug for Bip32Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bip32Node")
            .field("index", &self.index)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP32 test vector 1, seed 000102030405060708090a0b0c0d0e0f
    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const TV1_MASTER_CHAIN: &str =
        "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508";
    const TV1_MASTER_PUB: &str =
        "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2";
    const TV1_M0H_PUB: &str =
        "035a784662a4a20a65bf6aab9ae98a6c068a81c52e4b032c0fb5400c706cfccc56";
    const TV1_M0H_1_CHAIN: &str =
        "2a7857631386ba23dacac34180dd1983734e444fdbf774041578e9b6adb37c19";
    const TV1_M0H_1_PUB: &str =
        "03501e454bf00751f24b1b489aa925215d66af2234e3891c3b21a52bedb3cd711c";

    fn tv1_master() -> Arc<Bip32Node> {
        let seed = hex::decode(TV1_SEED).unwrap();
        Bip32Node::master_from_seed(&seed, None).unwrap()
    }

    #[test]
    fn test_master_from_seed_vector() {
        let master = tv1_master();
        assert_eq!(master.chain_code().unwrap().to_hex(), TV1_MASTER_CHAIN);
        assert_eq!(master.public_key().unwrap().to_hex(), TV1_MASTER_PUB);
        assert_eq!(master.index(), 0);
    }

    #[test]
    fn test_hardened_derivation_vector() {
        let master = tv1_master();
        let child = master.derive(HARDENED_OFFSET).unwrap();
        assert_eq!(child.public_key().unwrap().to_hex(), TV1_M0H_PUB);
        assert_eq!(child.index(), HARDENED_OFFSET);
    }

    #[test]
    fn test_non_hardened_derivation_vector() {
        let master = tv1_master();
        let child = master.derive(HARDENED_OFFSET).unwrap().derive(1).unwrap();
        assert_eq!(child.chain_code().unwrap().to_hex(), TV1_M0H_1_CHAIN);
        assert_eq!(child.public_key().unwrap().to_hex(), TV1_M0H_1_PUB);
    }

    #[test]
    fn test_derivation_is_memoized() {
        let master = tv1_master();
        let a = master.derive(5).unwrap();
        let b = master.derive(5).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = master.derive(6).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_custom_hmac_key_changes_tree() {
        let seed = hex::decode(TV1_SEED).unwrap();
        let default = Bip32Node::master_from_seed(&seed, None).unwrap();
        let custom = Bip32Node::master_from_seed(&seed, Some(b"Keyward test seed")).unwrap();
        assert_ne!(
            default.public_key().unwrap(),
            custom.public_key().unwrap()
        );
    }

    #[test]
    fn test_signature_is_canonical_and_verifies() {
        let master = tv1_master();
        let hash = MessageHash::of(b"keyward bip32 signing test");
        let sig = master.sign_prehashed(&hash).unwrap();
        assert!(sig.is_canonical());
        master.public_key().unwrap().verify(&hash, &sig).unwrap();

        // Deterministic: same input, same signature
        let again = master.sign_prehashed(&hash).unwrap();
        assert_eq!(sig, again);
    }

    #[test]
    fn test_recoverable_signature_is_canonical() {
        let master = tv1_master();
        let hash = MessageHash::of(b"recoverable");
        let sig = master.sign_recoverable(&hash).unwrap();
        assert!(sig.is_canonical());
        assert!(sig.recovery_id < 2);
    }

    #[test]
    fn test_exports_fail_with_isolation_error() {
        let master = tv1_master();
        assert!(matches!(
            master.export_xprv(),
            Err(Error::IsolationViolation("xprv"))
        ));
        assert!(matches!(
            master.export_wif(),
            Err(Error::IsolationViolation("WIF"))
        ));
    }

    #[test]
    fn test_revoke_blocks_all_operations() {
        let master = tv1_master();
        master.revoke();
        assert!(master.is_revoked());
        assert!(matches!(master.public_key(), Err(Error::RevokedAccess)));
        assert!(matches!(master.chain_code(), Err(Error::RevokedAccess)));
        assert!(matches!(master.derive(0), Err(Error::RevokedAccess)));
        assert!(matches!(
            master.sign(b"nope"),
            Err(Error::RevokedAccess)
        ));
    }

    #[test]
    fn test_revoke_cascades_to_memoized_children() {
        let master = tv1_master();
        let child = master.derive(HARDENED_OFFSET).unwrap();
        let grandchild = child.derive(1).unwrap();
        master.revoke();
        assert!(child.is_revoked());
        assert!(grandchild.is_revoked());
        assert!(matches!(grandchild.sign(b"x"), Err(Error::RevokedAccess)));
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert!(Bip32Node::master_from_seed(&[], None).is_err());
    }
}
