use std::io;
use std::path::PathBuf;

use openssl::error::ErrorStack;

/// Errors from wire framing and handshake field parsing.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("stream closed before the declared length was satisfied")]
    UnexpectedEof,

    #[error("filename is not valid UTF-8: {0}")]
    InvalidFilename(#[from] std::string::FromUtf8Error),

    #[error("filename has no usable final path component")]
    UnusableFilename,

    #[error(
        "declared ciphertext length {ciphertext} does not equal \
         plaintext length {plaintext} plus the tag length"
    )]
    LengthMismatch { plaintext: u64, ciphertext: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed for a {bits}-bit modulus")]
    KeyGen {
        bits: u32,
        #[source]
        source: ErrorStack,
    },

    #[error("malformed public key encoding")]
    KeyFormat(#[source] ErrorStack),

    #[error("sealed key could not be opened: wrong key or corrupted ciphertext")]
    Unseal(#[source] ErrorStack),

    #[error("seal payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("integrity tag verification failed: ciphertext is invalid or tampered")]
    Integrity,

    #[error("invalid session key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("cipher backend error")]
    Backend(#[from] ErrorStack),
}

/// Errors from transfer sessions and staging storage.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("another transfer is already pending decryption")]
    TransferPending,

    #[error("no transfer is pending decryption")]
    NothingPending,

    #[error("file I/O failed: {path}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source path has no sendable file name: {path}")]
    InvalidSource { path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("handshake timed out")]
    Timeout,
}

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
