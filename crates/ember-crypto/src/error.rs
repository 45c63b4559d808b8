use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Wrong key, tampered blob, or ciphertext not addressed to this key.
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("system RNG unavailable")]
    Rng,

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}
