//! Ember cryptographic layer — key pairs and the sealed-box transform.
//!
//! This crate provides:
//! - X25519 identity key pair generation and hex serialization
//! - `seal`: encrypt a plaintext to a recipient's public key
//!   (ephemeral ECDH + HKDF-SHA256 + AES-256-GCM)
//! - `open`: decrypt a sealed blob with the owner's private key
//!
//! Sealed blobs are anonymous: only the recipient's private key can open
//! them, and every call uses a fresh ephemeral key, so two encryptions of
//! the same plaintext never produce the same bytes.

pub mod error;
pub mod keys;
pub mod sealed;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use sealed::{open, seal};
