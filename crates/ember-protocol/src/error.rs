use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {0} bytes (max 65536)")]
    FrameTooLarge(usize),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
