//! secp256k1 field and point algebra
//!
//! Constrained byte-array types for scalars, SEC1 curve points, and
//! ECDSA signatures. Construction validates range and shape; invalid
//! byte patterns fail instead of silently coercing. Signature
//! canonicality follows the low-S/low-R convention used to prevent
//! malleability.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature as K256Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::Scalar;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use keyward_core::types::hex_bytes_33;
use keyward_core::{Error, MessageHash, Result};

/// secp256k1 curve order n, big-endian
pub const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
    0x41, 0x41,
];

/// n / 2, the low-S boundary, big-endian
pub const CURVE_ORDER_HALF: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
    0x20, 0xa0,
];

/// Whether `bytes` is a valid private scalar: exactly 32 bytes with a
/// value strictly between 0 and the curve order.
pub fn is_valid_field_element(bytes: &[u8]) -> bool {
    let Ok(arr) = <[u8; 32]>::try_from(bytes) else {
        return false;
    };
    match Option::<Scalar>::from(Scalar::from_repr(arr.into())) {
        Some(scalar) => !bool::from(scalar.is_zero()),
        None => false,
    }
}

/// A scalar in `(0, n)`, the range of valid secp256k1 private keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldElement([u8; 32]);

impl FieldElement {
    pub fn new(bytes: [u8; 32]) -> Result<Self> {
        if !is_valid_field_element(&bytes) {
            return Err(Error::InvalidKeyMaterial(
                "scalar out of range for secp256k1".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Compressed SEC1 curve point (33 bytes, tag 0x02 or 0x03)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedPoint(#[serde(with = "hex_bytes_33")] pub [u8; 33]);

impl CompressedPoint {
    /// Validate the bytes as a point on the curve and wrap them.
    pub fn new(bytes: [u8; 33]) -> Result<Self> {
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(Error::InvalidKeyMaterial(format!(
                "bad compressed point tag {:#04x}",
                bytes[0]
            )));
        }
        k256::PublicKey::from_sec1_bytes(&bytes)
            .map_err(|_| Error::InvalidKeyMaterial("point not on curve".to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 33] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!(
                "compressed point must be 33 bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 33];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
        Self::new(bytes)
    }

    /// Expand to the 65-byte uncompressed encoding of the same point.
    pub fn decompress(&self) -> Result<UncompressedPoint> {
        let point = k256::PublicKey::from_sec1_bytes(&self.0)
            .map_err(|_| Error::InvalidKeyMaterial("point not on curve".to_string()))?;
        let encoded = point.to_encoded_point(false);
        let bytes: [u8; 65] = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| Error::Crypto("unexpected uncompressed encoding length".to_string()))?;
        Ok(UncompressedPoint(bytes))
    }

    /// Verify an ECDSA signature over a 32-byte prehash.
    ///
    /// Pure function of the public key; never touches secret material.
    pub fn verify(&self, message_hash: &MessageHash, signature: &Signature) -> Result<()> {
        let verifying_key = VerifyingKey::from_sec1_bytes(&self.0)
            .map_err(|e| Error::Crypto(format!("invalid public key: {}", e)))?;
        let sig = K256Signature::from_slice(signature.as_bytes())
            .map_err(|e| Error::Crypto(format!("invalid signature format: {}", e)))?;
        verifying_key
            .verify_prehash(message_hash.as_bytes(), &sig)
            .map_err(|_| Error::Crypto("signature verification failed".to_string()))
    }
}

impl AsRef<[u8]> for CompressedPoint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Uncompressed SEC1 curve point (65 bytes, tag 0x04)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompressedPoint(pub [u8; 65]);

impl UncompressedPoint {
    /// Validate the bytes as a point on the curve and wrap them.
    pub fn new(bytes: [u8; 65]) -> Result<Self> {
        if bytes[0] != 0x04 {
            return Err(Error::InvalidKeyMaterial(format!(
                "bad uncompressed point tag {:#04x}",
                bytes[0]
            )));
        }
        k256::PublicKey::from_sec1_bytes(&bytes)
            .map_err(|_| Error::InvalidKeyMaterial("point not on curve".to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 65] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!(
                "uncompressed point must be 65 bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Contract to the 33-byte compressed encoding of the same point.
    pub fn compress(&self) -> Result<CompressedPoint> {
        let point = k256::PublicKey::from_sec1_bytes(&self.0)
            .map_err(|_| Error::InvalidKeyMaterial("point not on curve".to_string()))?;
        let encoded = point.to_encoded_point(true);
        let bytes: [u8; 33] = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| Error::Crypto("unexpected compressed encoding length".to_string()))?;
        Ok(CompressedPoint(bytes))
    }
}

impl AsRef<[u8]> for UncompressedPoint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compare two SEC1-encoded points by their underlying field values,
/// independent of compressed/uncompressed encoding.
pub fn points_equal(a: &[u8], b: &[u8]) -> Result<bool> {
    let pa = k256::PublicKey::from_sec1_bytes(a)
        .map_err(|_| Error::InvalidKeyMaterial("left operand is not a curve point".to_string()))?;
    let pb = k256::PublicKey::from_sec1_bytes(b)
        .map_err(|_| Error::InvalidKeyMaterial("right operand is not a curve point".to_string()))?;
    Ok(pa == pb)
}

/// ECDSA signature (64 bytes: r || s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
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

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Get the r component
    pub fn r(&self) -> &[u8; 32] {
        self.0[..32].try_into().expect("r is 32 bytes")
    }

    /// Get the s component
    pub fn s(&self) -> &[u8; 32] {
        self.0[32..].try_into().expect("s is 32 bytes")
    }

    /// s is in the lower half of the curve order
    pub fn is_low_s(&self) -> bool {
        *self.s() <= CURVE_ORDER_HALF
    }

    /// r's high bit is clear, so its DER encoding needs no padding byte
    pub fn is_low_r(&self) -> bool {
        self.r()[0] < 0x80
    }

    /// Canonical form: both components low
    pub fn is_canonical(&self) -> bool {
        self.is_low_s() && self.is_low_r()
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
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

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// ECDSA signature with its public-key recovery parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub signature: Signature,
    pub recovery_id: u8,
}

impl RecoverableSignature {
    pub fn new(signature: Signature, recovery_id: u8) -> Self {
        Self {
            signature,
            recovery_id,
        }
    }

    /// Canonical form additionally restricts the recovery parameter to
    /// the low range {0, 1}.
    pub fn is_canonical(&self) -> bool {
        self.recovery_id < 2 && self.signature.is_canonical()
    }
}
