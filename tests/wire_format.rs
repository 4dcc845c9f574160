//! Byte-exact checks of the handshake and ciphertext layout, driven by a
//! scripted peer that parses the wire by hand rather than through the codec.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use confidential_file_transport::session::sender::send_file_over;
use confidential_file_transport::{RsaIdentity, SessionKey, TransferConfig, TAG_LEN};

fn take_u32(wire: &[u8], at: &mut usize) -> u32 {
    let value = u32::from_be_bytes(wire[*at..*at + 4].try_into().unwrap());
    *at += 4;
    value
}

fn take_u64(wire: &[u8], at: &mut usize) -> u64 {
    let value = u64::from_be_bytes(wire[*at..*at + 8].try_into().unwrap());
    *at += 8;
    value
}

fn take_bytes<'a>(wire: &'a [u8], at: &mut usize, len: usize) -> &'a [u8] {
    let slice = &wire[*at..*at + len];
    *at += len;
    slice
}

#[tokio::test]
async fn sender_wire_layout_is_exact() {
    let sources = tempfile::tempdir().unwrap();
    let source = sources.path().join("hello.txt");
    std::fs::write(&source, b"hello world").unwrap();

    let identity = RsaIdentity::generate(2048).unwrap();
    let public_der = identity.public_key_der().unwrap();

    let (mut client, mut peer) = tokio::io::duplex(256 * 1024);

    // Scripted receiver: one length-prefixed public key frame, then capture
    // everything the sender writes until it closes.
    let peer_task = tokio::spawn(async move {
        let mut frame = Vec::with_capacity(4 + public_der.len());
        frame.extend_from_slice(&(public_der.len() as u32).to_be_bytes());
        frame.extend_from_slice(&public_der);
        peer.write_all(&frame).await.unwrap();
        peer.flush().await.unwrap();

        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).await.unwrap();
        wire
    });

    let (progress, _) = mpsc::unbounded_channel();
    send_file_over(&mut client, &source, &TransferConfig::default(), &progress)
        .await
        .unwrap();
    drop(client);
    let wire = peer_task.await.unwrap();

    let mut at = 0;

    // Field 1: sealed session key, one 2048-bit RSA block.
    let sealed_len = take_u32(&wire, &mut at) as usize;
    assert_eq!(sealed_len, 256);
    let sealed = take_bytes(&wire, &mut at, sealed_len).to_vec();

    // Field 2: 12-byte nonce.
    let nonce_len = take_u32(&wire, &mut at) as usize;
    assert_eq!(nonce_len, 12);
    let nonce = take_bytes(&wire, &mut at, nonce_len).to_vec();

    // Field 3: UTF-8 filename.
    let name_len = take_u32(&wire, &mut at) as usize;
    assert_eq!(take_bytes(&wire, &mut at, name_len), b"hello.txt");

    // Fields 4/5: bare 8-byte big-endian lengths, ciphertext = plaintext + 16.
    assert_eq!(take_u64(&wire, &mut at), 11);
    assert_eq!(take_u64(&wire, &mut at), 27);

    // Field 6: exactly the declared ciphertext, nothing after it.
    let ciphertext = &wire[at..];
    assert_eq!(ciphertext.len(), 27);

    // The captured stream decrypts with the unsealed key and wire nonce.
    let key_bytes = identity.open(&sealed).unwrap();
    let session = SessionKey::from_parts(&key_bytes, &nonce).unwrap();
    let mut decryptor =
        confidential_file_transport::crypto::stream::StreamDecryptor::new(&session).unwrap();
    let mut plaintext = decryptor.update(ciphertext).unwrap();
    plaintext.extend_from_slice(&decryptor.finish().unwrap());
    assert_eq!(&plaintext[..], b"hello world");
    assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
}
