use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::crypto::identity::RecipientKey;
use crate::crypto::stream::StreamEncryptor;
use crate::crypto::{SessionKey, TAG_LEN};
use crate::error::{Error, TransferError};
use crate::frame::{self, FrameCodec};
use crate::session::{TransferConfig, TransferEvent};
use crate::transport::tcp;

/// Start a transfer in a background task and return its event stream.
///
/// This is the shell-facing entry point: the stream yields
/// [`TransferEvent::Progress`] after each chunk and terminates with
/// [`TransferEvent::Completed`] or [`TransferEvent::Failed`].
pub fn start_transfer(
    path: PathBuf,
    addr: SocketAddr,
    config: TransferConfig,
) -> mpsc::UnboundedReceiver<TransferEvent> {
    let (events, stream) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        match send_file(&path, addr, &config, &events).await {
            Ok(()) => {
                events.send(TransferEvent::Completed).ok();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "transfer failed");
                events
                    .send(TransferEvent::Failed {
                        error: e.to_string(),
                    })
                    .ok();
            }
        }
    });
    stream
}

/// Send one file to `addr`, driving the full handshake and encrypted upload.
pub async fn send_file(
    path: &Path,
    addr: SocketAddr,
    config: &TransferConfig,
    events: &mpsc::UnboundedSender<TransferEvent>,
) -> Result<(), Error> {
    let mut stream = tcp::connect(addr, config.handshake_timeout)
        .await
        .map_err(Error::Io)?;
    tracing::debug!(%addr, "connected");
    send_file_over(&mut stream, path, config, events).await
}

/// Send one file over an already-connected transport.
///
/// Drives the sending side of the protocol in order: read the receiver's
/// public-key frame, seal a fresh session key to it, write the handshake
/// fields (sealed key, nonce, filename, plaintext length, ciphertext length),
/// then stream the encrypted file body and trailing tag. Any failure closes
/// the transport and is reported upward; nothing is retried.
pub async fn send_file_over<T: AsyncRead + AsyncWrite + Unpin>(
    transport: &mut T,
    path: &Path,
    config: &TransferConfig,
    events: &mpsc::UnboundedSender<TransferEvent>,
) -> Result<(), Error> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| TransferError::InvalidSource {
            path: path.to_path_buf(),
        })?
        .to_owned();

    let plaintext_len = tokio::fs::metadata(path)
        .await
        .map_err(|source| TransferError::FileIo {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let ciphertext_len = plaintext_len + TAG_LEN as u64;

    let mut codec = FrameCodec::new(config.max_frame_len);
    let mut read_buf = BytesMut::with_capacity(4096);

    let handshake = async {
        let public_der = frame::recv_frame(transport, &mut codec, &mut read_buf).await?;
        let recipient = RecipientKey::from_der(&public_der)?;
        tracing::debug!(key_len = public_der.len(), "received receiver public key");

        let session = SessionKey::generate();
        let sealed = recipient.seal(session.key())?;

        frame::send_frame(transport, &mut codec, &sealed).await?;
        frame::send_frame(transport, &mut codec, session.nonce()).await?;
        frame::send_frame(transport, &mut codec, filename.as_bytes()).await?;
        frame::send_u64(transport, plaintext_len).await?;
        frame::send_u64(transport, ciphertext_len).await?;

        Ok::<SessionKey, Error>(session)
    };
    let session = tokio::time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| TransferError::Timeout)??;

    tracing::info!(
        file = %filename,
        bytes = plaintext_len,
        "handshake complete, streaming"
    );

    let mut source = File::open(path)
        .await
        .map_err(|source| TransferError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
    let mut encryptor = StreamEncryptor::new(&session)?;
    let mut buf = vec![0u8; config.chunk_size];
    let mut sent: u64 = 0;

    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|source| TransferError::FileIo {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        let ciphertext = encryptor.update(&buf[..n])?;
        transport.write_all(&ciphertext).await.map_err(Error::Io)?;

        sent += n as u64;
        events
            .send(TransferEvent::Progress {
                bytes_sent: sent,
                total_bytes: plaintext_len,
            })
            .ok();
    }

    // Final flush emits the integrity tag.
    let tail = encryptor.finish()?;
    transport.write_all(&tail).await.map_err(Error::Io)?;
    transport.flush().await.map_err(Error::Io)?;
    transport.shutdown().await.map_err(Error::Io)?;

    tracing::info!(file = %filename, bytes = plaintext_len, "upload complete");
    Ok(())
}
