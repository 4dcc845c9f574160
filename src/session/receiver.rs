use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::crypto::identity::RsaIdentity;
use crate::crypto::stream::StreamDecryptor;
use crate::crypto::{SessionKey, TAG_LEN};
use crate::error::{Error, ProtocolError, TransferError};
use crate::frame::bounded::BoundedReader;
use crate::frame::{self, FrameCodec};
use crate::session::{ReceiverEvent, StagedCiphertextPolicy, TransferConfig};
use crate::transport::tcp;

/// Descriptive fields of one transfer, as declared in its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    pub filename: String,
    pub plaintext_len: u64,
    pub ciphertext_len: u64,
}

/// A fully ingested transfer awaiting its decrypt trigger.
#[derive(Debug)]
struct PendingTransfer {
    session_key: SessionKey,
    staged_path: PathBuf,
    metadata: TransferMetadata,
}

/// The receiver's single transfer slot.
///
/// `Ingesting` reserves the slot for a connection that passed its handshake
/// but has not finished staging; reserving before ingestion is what makes
/// the one-pending-transfer rule race-free when connections arrive
/// concurrently.
#[derive(Debug)]
enum Slot {
    Idle,
    Ingesting,
    Pending(PendingTransfer),
}

/// Receiving endpoint: accepts connections, stages encrypted uploads, and
/// decrypts them on an explicit external trigger.
///
/// Cheap to clone; clones share the identity, the pending slot, and the
/// event channel.
#[derive(Clone)]
pub struct FileReceiver {
    identity: Arc<RsaIdentity>,
    staging_dir: PathBuf,
    config: TransferConfig,
    pending: Arc<Mutex<Slot>>,
    events: mpsc::UnboundedSender<ReceiverEvent>,
}

impl FileReceiver {
    /// Create a receiver staging into `staging_dir` (created if absent).
    ///
    /// Returns the receiver and the stream of [`ReceiverEvent`]s for the
    /// external shell. Event delivery is fire-and-forget; dropping the
    /// stream only mutes it.
    pub fn new(
        identity: RsaIdentity,
        staging_dir: impl Into<PathBuf>,
        config: TransferConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ReceiverEvent>), Error> {
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir).map_err(|source| TransferError::FileIo {
            path: staging_dir.clone(),
            source,
        })?;

        let (events, stream) = mpsc::unbounded_channel();
        Ok((
            Self {
                identity: Arc::new(identity),
                staging_dir,
                config,
                pending: Arc::new(Mutex::new(Slot::Idle)),
                events,
            },
            stream,
        ))
    }

    /// Accept connections forever, handling each in its own task.
    pub async fn run(&self, listener: TcpListener) -> Result<(), Error> {
        tracing::info!(
            addr = %listener.local_addr().map_err(Error::Io)?,
            "receiver listening"
        );
        loop {
            let (stream, peer_addr) = tcp::accept(&listener).await.map_err(Error::Io)?;
            let receiver = self.clone();
            tokio::spawn(async move {
                tracing::debug!(%peer_addr, "accepted connection");
                if let Err(e) = receiver.handle_connection(stream).await {
                    tracing::warn!(%peer_addr, error = %e, "transfer connection failed");
                }
            });
        }
    }

    /// Drive one connection: publish our public key, read the handshake,
    /// and ingest the declared ciphertext into the staging directory.
    ///
    /// The ciphertext is stored verbatim; decryption happens only via
    /// [`trigger_decrypt`](Self::trigger_decrypt). If a transfer is already
    /// pending, the connection is rejected without touching it.
    pub async fn handle_connection<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut transport: T,
    ) -> Result<(), Error> {
        let mut codec = FrameCodec::new(self.config.max_frame_len);
        let mut read_buf = BytesMut::with_capacity(4096);

        let handshake = self.handshake(&mut transport, &mut codec, &mut read_buf);
        let (session_key, metadata) = tokio::time::timeout(self.config.handshake_timeout, handshake)
            .await
            .map_err(|_| TransferError::Timeout)??;

        // Reserve the slot before a single ciphertext byte is accepted.
        {
            let mut slot = self.pending.lock().expect("pending slot lock poisoned");
            if !matches!(*slot, Slot::Idle) {
                drop(slot);
                tracing::warn!(
                    file = %metadata.filename,
                    "rejecting transfer: another transfer is pending decryption"
                );
                self.events
                    .send(ReceiverEvent::TransferRejected {
                        filename: metadata.filename.clone(),
                    })
                    .ok();
                return Err(TransferError::TransferPending.into());
            }
            *slot = Slot::Ingesting;
        }

        let staged_path = self
            .staging_dir
            .join(format!("{}.enc", metadata.filename));
        let ingested = self
            .ingest(&mut transport, read_buf, &staged_path, metadata.ciphertext_len)
            .await;

        match ingested {
            Ok(()) => {
                tracing::info!(
                    file = %metadata.filename,
                    staged = %staged_path.display(),
                    bytes = metadata.ciphertext_len,
                    "ciphertext staged, awaiting decrypt trigger"
                );
                let staged_event = ReceiverEvent::TransferStaged {
                    filename: metadata.filename.clone(),
                    plaintext_len: metadata.plaintext_len,
                };
                {
                    let mut slot = self.pending.lock().expect("pending slot lock poisoned");
                    *slot = Slot::Pending(PendingTransfer {
                        session_key,
                        staged_path,
                        metadata,
                    });
                }
                self.events.send(staged_event).ok();
                Ok(())
            }
            Err(e) => {
                // A partial staging file must never become decryptable.
                {
                    let mut slot = self.pending.lock().expect("pending slot lock poisoned");
                    *slot = Slot::Idle;
                }
                tokio::fs::remove_file(&staged_path).await.ok();
                Err(e)
            }
        }
    }

    async fn handshake<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        transport: &mut T,
        codec: &mut FrameCodec,
        read_buf: &mut BytesMut,
    ) -> Result<(SessionKey, TransferMetadata), Error> {
        let public_der = self.identity.public_key_der()?;
        frame::send_frame(transport, codec, &public_der).await?;

        let sealed_key = frame::recv_frame(transport, codec, read_buf).await?;
        let nonce = frame::recv_frame(transport, codec, read_buf).await?;
        let filename_raw = frame::recv_frame(transport, codec, read_buf).await?;
        let plaintext_len = frame::recv_u64(transport, read_buf).await?;
        let ciphertext_len = frame::recv_u64(transport, read_buf).await?;

        if plaintext_len.checked_add(TAG_LEN as u64) != Some(ciphertext_len) {
            return Err(ProtocolError::LengthMismatch {
                plaintext: plaintext_len,
                ciphertext: ciphertext_len,
            }
            .into());
        }

        let filename = String::from_utf8(filename_raw.to_vec())
            .map_err(ProtocolError::InvalidFilename)?;
        // Wire-supplied names must not escape the staging directory.
        let filename = Path::new(&filename)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or(ProtocolError::UnusableFilename)?;

        let key_bytes = self.identity.open(&sealed_key)?;
        let session_key = SessionKey::from_parts(&key_bytes, &nonce)?;

        tracing::debug!(
            file = %filename,
            plaintext_len,
            ciphertext_len,
            nonce = %hex::encode(&nonce),
            "handshake parsed"
        );

        Ok((
            session_key,
            TransferMetadata {
                filename,
                plaintext_len,
                ciphertext_len,
            },
        ))
    }

    /// Copy exactly `ciphertext_len` bytes (residual handshake buffer
    /// first, then the transport) into the staging file, verbatim.
    async fn ingest<T: AsyncRead + Unpin>(
        &self,
        transport: &mut T,
        read_buf: BytesMut,
        staged_path: &Path,
        ciphertext_len: u64,
    ) -> Result<(), Error> {
        let mut staged =
            File::create(staged_path)
                .await
                .map_err(|source| TransferError::FileIo {
                    path: staged_path.to_path_buf(),
                    source,
                })?;

        let residual = Cursor::new(read_buf.freeze());
        let mut bounded = BoundedReader::new(residual.chain(transport), ciphertext_len);

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut total: u64 = 0;
        loop {
            let n = bounded.read(&mut buf).await.map_err(Error::Io)?;
            if n == 0 {
                break;
            }
            staged
                .write_all(&buf[..n])
                .await
                .map_err(|source| TransferError::FileIo {
                    path: staged_path.to_path_buf(),
                    source,
                })?;
            total += n as u64;
        }
        staged
            .flush()
            .await
            .map_err(|source| TransferError::FileIo {
                path: staged_path.to_path_buf(),
                source,
            })?;

        if total != ciphertext_len {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Decrypt the staged transfer into `<staging_dir>/<filename>`.
    ///
    /// Driven by the external trigger, never by the ingesting connection.
    /// The pending slot is cleared whatever the outcome. On success the
    /// staged ciphertext is deleted and the output path returned; on failure
    /// the partial plaintext is deleted and the staged file is kept or
    /// deleted per [`TransferConfig::on_decrypt_failure`].
    pub async fn trigger_decrypt(&self) -> Result<PathBuf, Error> {
        let pending = {
            let mut slot = self.pending.lock().expect("pending slot lock poisoned");
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Pending(pending) => pending,
                other => {
                    *slot = other;
                    return Err(TransferError::NothingPending.into());
                }
            }
        };

        let output_path = self.staging_dir.join(&pending.metadata.filename);
        tracing::info!(
            staged = %pending.staged_path.display(),
            output = %output_path.display(),
            "decrypting staged transfer"
        );

        match self.decrypt_staged(&pending, &output_path).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&pending.staged_path).await {
                    tracing::debug!(
                        staged = %pending.staged_path.display(),
                        error = %e,
                        "staged ciphertext cleanup failed"
                    );
                }
                tracing::info!(output = %output_path.display(), "decryption complete");
                self.events
                    .send(ReceiverEvent::DecryptSucceeded {
                        output: output_path.clone(),
                    })
                    .ok();
                Ok(output_path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "decryption failed");
                tokio::fs::remove_file(&output_path).await.ok();
                if self.config.on_decrypt_failure == StagedCiphertextPolicy::Delete {
                    tokio::fs::remove_file(&pending.staged_path).await.ok();
                }
                self.events
                    .send(ReceiverEvent::DecryptFailed {
                        error: e.to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    async fn decrypt_staged(
        &self,
        pending: &PendingTransfer,
        output_path: &Path,
    ) -> Result<(), Error> {
        let mut decryptor = StreamDecryptor::new(&pending.session_key)?;

        let mut staged =
            File::open(&pending.staged_path)
                .await
                .map_err(|source| TransferError::FileIo {
                    path: pending.staged_path.clone(),
                    source,
                })?;
        let mut output = File::create(output_path)
            .await
            .map_err(|source| TransferError::FileIo {
                path: output_path.to_path_buf(),
                source,
            })?;

        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = staged
                .read(&mut buf)
                .await
                .map_err(|source| TransferError::FileIo {
                    path: pending.staged_path.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            let plaintext = decryptor.update(&buf[..n])?;
            if !plaintext.is_empty() {
                output
                    .write_all(&plaintext)
                    .await
                    .map_err(|source| TransferError::FileIo {
                        path: output_path.to_path_buf(),
                        source,
                    })?;
            }
        }

        // Authoritative tag check; everything written so far was provisional.
        let tail = decryptor.finish()?;
        if !tail.is_empty() {
            output
                .write_all(&tail)
                .await
                .map_err(|source| TransferError::FileIo {
                    path: output_path.to_path_buf(),
                    source,
                })?;
        }
        output
            .flush()
            .await
            .map_err(|source| TransferError::FileIo {
                path: output_path.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    /// Whether a transfer is currently awaiting its decrypt trigger.
    pub fn has_pending(&self) -> bool {
        matches!(
            *self.pending.lock().expect("pending slot lock poisoned"),
            Slot::Pending(_)
        )
    }

    /// Metadata of the pending transfer, if any.
    pub fn pending_metadata(&self) -> Option<TransferMetadata> {
        match &*self.pending.lock().expect("pending slot lock poisoned") {
            Slot::Pending(pending) => Some(pending.metadata.clone()),
            _ => None,
        }
    }

    /// Drop a pending transfer without decrypting it, removing its staged
    /// ciphertext. A slot reserved by an in-flight ingestion is left alone.
    pub async fn clear_pending(&self) -> Result<(), Error> {
        let pending = {
            let mut slot = self.pending.lock().expect("pending slot lock poisoned");
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Pending(pending) => pending,
                other => {
                    *slot = other;
                    return Ok(());
                }
            }
        };
        tokio::fs::remove_file(&pending.staged_path)
            .await
            .map_err(|source| TransferError::FileIo {
                path: pending.staged_path.clone(),
                source,
            })?;
        tracing::info!(
            staged = %pending.staged_path.display(),
            "pending transfer cleared"
        );
        Ok(())
    }
}
