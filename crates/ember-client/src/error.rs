use ember_protocol::Identity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ember_protocol::ProtocolError),

    #[error(transparent)]
    Crypto(#[from] ember_crypto::CryptoError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no contact record for {0}")]
    UnknownContact(Identity),

    #[error("handshake with {0} is not established")]
    NotEstablished(Identity),

    #[error("background task failed: {0}")]
    TaskJoin(String),
}
