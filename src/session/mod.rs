pub mod receiver;
pub mod sender;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, TransferError};

/// What to do with the staged ciphertext file when decryption fails.
///
/// Only a successful decryption ever removes the staged file on its own;
/// keeping it after a failure allows inspection or a later retry by an
/// operator, while deleting avoids leaving undecryptable material in the
/// staging directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedCiphertextPolicy {
    Keep,
    Delete,
}

/// Configuration shared by sending and receiving sessions.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Read/encrypt chunk size in bytes (default: 8 KiB).
    pub chunk_size: usize,

    /// Maximum accepted handshake frame payload (default: 64 KiB).
    pub max_frame_len: u32,

    /// Maximum time allowed for connect + handshake (default: 30s). The bulk
    /// ciphertext phase is not bounded: transfer time scales with file size.
    pub handshake_timeout: Duration,

    /// Disposition of the staged ciphertext after a failed decryption
    /// (default: keep).
    pub on_decrypt_failure: StagedCiphertextPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024,
            max_frame_len: crate::frame::MAX_FRAME_LEN,
            handshake_timeout: Duration::from_secs(30),
            on_decrypt_failure: StagedCiphertextPolicy::Keep,
        }
    }
}

impl TransferConfig {
    /// Create a builder for constructing a `TransferConfig`.
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }
}

/// Builder for [`TransferConfig`].
#[derive(Debug, Clone)]
pub struct TransferConfigBuilder {
    chunk_size: usize,
    max_frame_len: u32,
    handshake_timeout: Duration,
    on_decrypt_failure: StagedCiphertextPolicy,
}

impl Default for TransferConfigBuilder {
    fn default() -> Self {
        let defaults = TransferConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            max_frame_len: defaults.max_frame_len,
            handshake_timeout: defaults.handshake_timeout,
            on_decrypt_failure: defaults.on_decrypt_failure,
        }
    }
}

impl TransferConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn max_frame_len(mut self, len: u32) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn on_decrypt_failure(mut self, policy: StagedCiphertextPolicy) -> Self {
        self.on_decrypt_failure = policy;
        self
    }

    /// Build the `TransferConfig`, validating that all values are sensible.
    pub fn build(self) -> Result<TransferConfig, Error> {
        if self.chunk_size == 0 {
            return Err(invalid_config("chunk_size must be > 0"));
        }
        if self.max_frame_len == 0 {
            return Err(invalid_config("max_frame_len must be > 0"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(invalid_config("handshake_timeout must be > 0"));
        }
        Ok(TransferConfig {
            chunk_size: self.chunk_size,
            max_frame_len: self.max_frame_len,
            handshake_timeout: self.handshake_timeout,
            on_decrypt_failure: self.on_decrypt_failure,
        })
    }
}

fn invalid_config(message: &'static str) -> Error {
    TransferError::InvalidConfig(message).into()
}

/// Progress events emitted by a sending session.
///
/// Delivery is fire-and-forget over an unbounded channel: a slow or absent
/// observer never stalls the encrypt pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Cumulative bytes read from the source file, reported after each chunk.
    Progress { bytes_sent: u64, total_bytes: u64 },
    /// The upload finished and the transport was flushed and closed.
    Completed,
    /// The transfer failed; no retry is attempted.
    Failed { error: String },
}

impl TransferEvent {
    /// Percentage complete for a progress event, if this is one.
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Progress {
                bytes_sent,
                total_bytes,
            } => {
                // An empty file is complete the moment streaming starts.
                if *total_bytes == 0 {
                    Some(100)
                } else {
                    Some((bytes_sent.saturating_mul(100) / total_bytes).min(100) as u8)
                }
            }
            _ => None,
        }
    }
}

/// Events emitted by the receiving side for an external observer (UI shell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// Ciphertext was fully ingested; a transfer now awaits the decrypt
    /// trigger.
    TransferStaged { filename: String, plaintext_len: u64 },
    /// A connection was turned away because a transfer is already pending.
    TransferRejected { filename: String },
    /// An explicitly triggered decryption produced a plaintext file.
    DecryptSucceeded { output: PathBuf },
    /// An explicitly triggered decryption failed; partial output was removed.
    DecryptFailed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match() {
        let built = TransferConfig::builder().build().unwrap();
        let defaults = TransferConfig::default();
        assert_eq!(built.chunk_size, defaults.chunk_size);
        assert_eq!(built.max_frame_len, defaults.max_frame_len);
        assert_eq!(built.handshake_timeout, defaults.handshake_timeout);
        assert_eq!(built.on_decrypt_failure, StagedCiphertextPolicy::Keep);
    }

    #[test]
    fn builder_rejects_zero_values() {
        assert!(TransferConfig::builder().chunk_size(0).build().is_err());
        assert!(TransferConfig::builder().max_frame_len(0).build().is_err());
        assert!(TransferConfig::builder()
            .handshake_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn percent_handles_empty_files() {
        let event = TransferEvent::Progress {
            bytes_sent: 0,
            total_bytes: 0,
        };
        assert_eq!(event.percent(), Some(100));

        let halfway = TransferEvent::Progress {
            bytes_sent: 5,
            total_bytes: 10,
        };
        assert_eq!(halfway.percent(), Some(50));
        assert_eq!(TransferEvent::Completed.percent(), None);
    }
}
