//! Endpoint-side library: session lifecycle, contact handshakes, the
//! encrypted message ledger, and the reconnecting relay transport.
//!
//! The relay only ever sees ciphertext; everything here that touches
//! plaintext or key material stays on the local machine and is destroyed
//! when the session expires or is wiped.

pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod ledger;
pub mod session;
pub mod storage;
pub mod transport;

pub use endpoint::{Command, EndpointHandle, Event};
pub use error::ClientError;
pub use handshake::HandshakeState;
pub use ledger::{Author, ReadBody, ReadEntry};
pub use session::{Session, SESSION_TTL};
pub use storage::{FileStore, MemoryStore, Store};
pub use transport::Transport;

pub use ember_protocol::{Envelope, Identity};
