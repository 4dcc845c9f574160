use openssl::encrypt::{Decrypter, Encrypter};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};

use crate::error::CryptoError;

/// Default RSA modulus size for a receiver identity.
pub const DEFAULT_KEY_BITS: u32 = 2048;

/// OAEP digest length (SHA-256) in bytes.
const OAEP_DIGEST_LEN: usize = 32;

/// A long-lived RSA key pair held by the receiving endpoint.
///
/// The public half travels to senders as X.509 SubjectPublicKeyInfo DER; the
/// private half opens sealed session keys. OAEP (SHA-256 + MGF1-SHA-256)
/// padding keeps seals non-deterministic. The key is not bound to any external
/// identity: peers trust it on first use.
pub struct RsaIdentity {
    pkey: PKey<Private>,
}

impl RsaIdentity {
    /// Generate a fresh key pair with the given modulus size in bits.
    pub fn generate(bits: u32) -> Result<Self, CryptoError> {
        let rsa = Rsa::generate(bits).map_err(|source| CryptoError::KeyGen { bits, source })?;
        let pkey = PKey::from_rsa(rsa).map_err(|source| CryptoError::KeyGen { bits, source })?;
        Ok(Self { pkey })
    }

    /// Export the public key as X.509 SubjectPublicKeyInfo DER, suitable for
    /// transmission and reconstruction via [`RecipientKey::from_der`].
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.pkey.public_key_to_der()?)
    }

    /// Recover a secret sealed to this identity's public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut decrypter = Decrypter::new(&self.pkey)?;
        decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
        decrypter.set_rsa_oaep_md(MessageDigest::sha256())?;
        decrypter.set_rsa_mgf1_md(MessageDigest::sha256())?;

        let mut out = vec![0u8; decrypter.decrypt_len(sealed).map_err(CryptoError::Unseal)?];
        let n = decrypter
            .decrypt(sealed, &mut out)
            .map_err(CryptoError::Unseal)?;
        out.truncate(n);
        Ok(out)
    }
}

/// A sender-side handle to a receiver's public key.
pub struct RecipientKey {
    pkey: PKey<Public>,
    modulus_len: usize,
}

impl RecipientKey {
    /// Parse a public key from X.509 SubjectPublicKeyInfo DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let rsa = Rsa::public_key_from_der(der).map_err(CryptoError::KeyFormat)?;
        let modulus_len = rsa.size() as usize;
        let pkey = PKey::from_rsa(rsa).map_err(CryptoError::KeyFormat)?;
        Ok(Self { pkey, modulus_len })
    }

    /// Largest secret this key can seal under OAEP.
    pub fn max_seal_payload(&self) -> usize {
        self.modulus_len - 2 * OAEP_DIGEST_LEN - 2
    }

    /// Seal a short secret to this key. The result is one RSA block
    /// (`modulus_len` bytes).
    pub fn seal(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        // The only secret sealed in practice is the 32-byte session key, far
        // below the OAEP limit; oversized input would otherwise surface as an
        // opaque backend error.
        if secret.len() > self.max_seal_payload() {
            return Err(CryptoError::PayloadTooLarge {
                size: secret.len(),
                max: self.max_seal_payload(),
            });
        }

        let mut encrypter = Encrypter::new(&self.pkey)?;
        encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
        encrypter.set_rsa_oaep_md(MessageDigest::sha256())?;
        encrypter.set_rsa_mgf1_md(MessageDigest::sha256())?;

        let mut out = vec![0u8; encrypter.encrypt_len(secret)?];
        let n = encrypter.encrypt(secret, &mut out)?;
        out.truncate(n);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let identity = RsaIdentity::generate(2048).unwrap();
        let recipient = RecipientKey::from_der(&identity.public_key_der().unwrap()).unwrap();

        let secret = [0x42u8; 32];
        let sealed = recipient.seal(&secret).unwrap();

        // One RSA block, never the plaintext itself.
        assert_eq!(sealed.len(), 256);
        assert_ne!(&sealed[..32], &secret[..]);

        let opened = identity.open(&sealed).unwrap();
        assert_eq!(opened, secret);
    }

    #[test]
    fn seal_is_randomized() {
        let identity = RsaIdentity::generate(2048).unwrap();
        let recipient = RecipientKey::from_der(&identity.public_key_der().unwrap()).unwrap();

        let a = recipient.seal(b"same secret").unwrap();
        let b = recipient.seal(b"same secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let alice = RsaIdentity::generate(2048).unwrap();
        let bob = RsaIdentity::generate(2048).unwrap();
        let to_alice = RecipientKey::from_der(&alice.public_key_der().unwrap()).unwrap();

        let sealed = to_alice.seal(&[7u8; 32]).unwrap();
        let result = bob.open(&sealed);
        assert!(matches!(result, Err(CryptoError::Unseal(_))));
    }

    #[test]
    fn open_corrupted_seal_fails() {
        let identity = RsaIdentity::generate(2048).unwrap();
        let recipient = RecipientKey::from_der(&identity.public_key_der().unwrap()).unwrap();

        let mut sealed = recipient.seal(&[7u8; 32]).unwrap();
        sealed[10] ^= 0x01;
        assert!(matches!(identity.open(&sealed), Err(CryptoError::Unseal(_))));
    }

    #[test]
    fn malformed_der_rejected() {
        let result = RecipientKey::from_der(b"not a key");
        assert!(matches!(result, Err(CryptoError::KeyFormat(_))));
    }

    #[test]
    fn oversized_payload_rejected() {
        let identity = RsaIdentity::generate(2048).unwrap();
        let recipient = RecipientKey::from_der(&identity.public_key_der().unwrap()).unwrap();

        let big = vec![0u8; recipient.max_seal_payload() + 1];
        assert!(matches!(
            recipient.seal(&big),
            Err(CryptoError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn unsupported_modulus_rejected() {
        assert!(matches!(
            RsaIdentity::generate(0),
            Err(CryptoError::KeyGen { bits: 0, .. })
        ));
    }
}
