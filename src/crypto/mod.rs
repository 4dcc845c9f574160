pub mod identity;
pub mod stream;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AEAD nonce length in bytes (GCM 96-bit IV).
pub const NONCE_LEN: usize = 12;

/// AEAD integrity tag length in bytes.
pub const TAG_LEN: usize = 16;

/// One-time symmetric key material for a single transfer.
///
/// Generated fresh by the sender for every transfer and never persisted. The
/// same (key, nonce) pair must never encrypt twice; the cipher layer cannot
/// detect reuse, so freshness is this type's contract. Material is wiped on
/// drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
}

impl SessionKey {
    /// Generate fresh key and nonce from the OS random source.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    /// Reassemble a session key from wire-recovered parts.
    pub fn from_parts(key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        let key_arr: [u8; KEY_LEN] =
            key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            })?;
        let nonce_arr: [u8; NONCE_LEN] =
            nonce
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_LEN,
                    actual: nonce.len(),
                })?;
        Ok(Self {
            key: key_arr,
            nonce: nonce_arr,
        })
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs.
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}
