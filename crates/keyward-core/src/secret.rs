//! Secure byte container with an explicit zeroizing lifecycle
//!
//! All private key material in Keyward lives inside [`SecretBytes`].
//! The buffer is copied in at construction, read only through a scoped
//! closure, and overwritten with zeros on revocation. Dropping the
//! container also zeroizes as a backstop, but explicit revocation is
//! the supported lifecycle: relying on the allocator to reclaim secret
//! memory is not deterministic enough.

use std::fmt;
use std::sync::Mutex;

use zeroize::Zeroize;

use crate::error::{Error, Result};

struct Inner {
    buf: Vec<u8>,
    revoked: bool,
}

/// An owned byte buffer that guarantees explicit zero-fill on release.
///
/// Reads after [`SecretBytes::revoke`] fail with [`Error::RevokedAccess`]
/// rather than returning zeroed bytes, so use-after-revoke bugs surface
/// as errors instead of silent wrong answers.
pub struct SecretBytes {
    inner: Mutex<Inner>,
}

impl SecretBytes {
    /// Copy `bytes` into a new container.
    ///
    /// The input slice is not zeroized; callers that own sensitive
    /// source buffers are responsible for wiping them.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: bytes.to_vec(),
                revoked: false,
            }),
        }
    }

    /// Length of the contained buffer, or an error after revocation.
    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.lock().expect("secret lock poisoned");
        if inner.revoked {
            return Err(Error::RevokedAccess);
        }
        Ok(inner.buf.len())
    }

    /// Run `f` over the secret bytes without letting them escape.
    ///
    /// The closure receives a borrow that cannot outlive the call, so
    /// this is the only read path and it stays inside the isolation
    /// boundary.
    pub fn expose<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let inner = self.inner.lock().expect("secret lock poisoned");
        if inner.revoked {
            return Err(Error::RevokedAccess);
        }
        Ok(f(&inner.buf))
    }

    /// Overwrite every byte with zero and mark the container revoked.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn revoke(&self) {
        let mut inner = self.inner.lock().expect("secret lock poisoned");
        if !inner.revoked {
            // The slice view wipes without truncating; zeroizing the
            // Vec itself would also clear it.
            inner.buf.as_mut_slice().zeroize();
            inner.revoked = true;
        }
    }

    /// Whether the container has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.inner.lock().expect("secret lock poisoned").revoked
    }

    /// Test-only view of the raw buffer, bypassing the revocation check.
    #[cfg(test)]
    pub(crate) fn raw_for_tests(&self) -> Vec<u8> {
        self.inner.lock().unwrap().buf.clone()
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            inner.buf.zeroize();
        }
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let revoked = self.is_revoked();
        f.debug_struct("SecretBytes")
            .field("revoked", &revoked)
            .finish_non_exhaustive()
    }
}
