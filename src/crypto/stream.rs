use openssl::symm::{Cipher, Crypter, Mode};

use super::{SessionKey, TAG_LEN};
use crate::error::CryptoError;

/// Streaming AES-256-GCM encryptor.
///
/// Accepts sequential plaintext chunks and emits ciphertext of the same
/// length; [`finish`](Self::finish) emits the trailing 16-byte tag. Total
/// output for N input bytes is exactly N + 16.
pub struct StreamEncryptor {
    crypter: Crypter,
    block_size: usize,
}

impl StreamEncryptor {
    pub fn new(session: &SessionKey) -> Result<Self, CryptoError> {
        let cipher = Cipher::aes_256_gcm();
        let crypter = Crypter::new(cipher, Mode::Encrypt, session.key(), Some(session.nonce()))?;
        Ok(Self {
            crypter,
            block_size: cipher.block_size(),
        })
    }

    /// Encrypt the next plaintext chunk.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; chunk.len() + self.block_size];
        let n = self.crypter.update(chunk, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Flush the cipher and append the integrity tag.
    pub fn finish(mut self) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; self.block_size];
        let n = self.crypter.finalize(&mut out)?;
        out.truncate(n);

        let mut tag = [0u8; TAG_LEN];
        self.crypter.get_tag(&mut tag)?;
        out.extend_from_slice(&tag);
        Ok(out)
    }
}

/// Streaming AES-256-GCM decryptor.
///
/// Accepts sequential ciphertext chunks *including* the trailing tag bytes.
/// The last [`TAG_LEN`] bytes seen are always withheld as the candidate tag;
/// everything before them is emitted as provisional plaintext. Only a
/// successful [`finish`](Self::finish) makes that plaintext authoritative;
/// callers must discard partially written output when it fails.
pub struct StreamDecryptor {
    crypter: Crypter,
    block_size: usize,
    tail: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(session: &SessionKey) -> Result<Self, CryptoError> {
        let cipher = Cipher::aes_256_gcm();
        let crypter = Crypter::new(cipher, Mode::Decrypt, session.key(), Some(session.nonce()))?;
        Ok(Self {
            crypter,
            block_size: cipher.block_size(),
            tail: Vec::with_capacity(TAG_LEN),
        })
    }

    /// Decrypt the next ciphertext chunk, withholding the candidate tag.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.tail.extend_from_slice(chunk);
        if self.tail.len() <= TAG_LEN {
            return Ok(Vec::new());
        }

        let feed = self.tail.len() - TAG_LEN;
        let mut out = vec![0u8; feed + self.block_size];
        let n = self.crypter.update(&self.tail[..feed], &mut out)?;
        out.truncate(n);
        self.tail.drain(..feed);
        Ok(out)
    }

    /// Verify the tag and flush any remaining plaintext.
    pub fn finish(mut self) -> Result<Vec<u8>, CryptoError> {
        // A stream shorter than the tag itself can never authenticate.
        if self.tail.len() < TAG_LEN {
            return Err(CryptoError::Integrity);
        }
        self.crypter
            .set_tag(&self.tail)
            .map_err(|_| CryptoError::Integrity)?;

        let mut out = vec![0u8; self.block_size];
        let n = self
            .crypter
            .finalize(&mut out)
            .map_err(|_| CryptoError::Integrity)?;
        out.truncate(n);
        Ok(out)
    }
}
