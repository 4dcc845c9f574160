pub mod crypto;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;

// Re-export key types at crate root for convenience.
pub use crypto::identity::{RecipientKey, RsaIdentity, DEFAULT_KEY_BITS};
pub use crypto::{SessionKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use error::{CryptoError, Error, ProtocolError, Result, TransferError};
pub use frame::bounded::BoundedReader;
pub use session::receiver::{FileReceiver, TransferMetadata};
pub use session::sender::{send_file, send_file_over, start_transfer};
pub use session::{ReceiverEvent, StagedCiphertextPolicy, TransferConfig, TransferEvent};
