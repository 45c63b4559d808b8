//! X25519 identity key pairs.
//!
//! Each endpoint has one long-term key pair bound to its identity for the
//! lifetime of a session. Only the public half ever goes on the wire, as a
//! 64-character hex string. The secret half zeroizes on drop.

use std::fmt;

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};

use crate::error::CryptoError;

/// Length of raw key material, both halves.
pub const KEY_LEN: usize = 32;

/// The private half of an identity key pair. Never leaves the endpoint.
#[derive(Clone)]
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Ok(Self(StaticSecret::from(decode_key(s)?)))
    }

    pub(crate) fn inner(&self) -> &StaticSecret {
        &self.0
    }
}

// Never print secret material, even in debug logs.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// The shareable half of an identity key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(XPublicKey);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Ok(Self(XPublicKey::from(decode_key(s)?)))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    pub(crate) fn inner(&self) -> &XPublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// An owning (secret, public) pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the system RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = XPublicKey::from(&secret);
        Self {
            secret: SecretKey(secret),
            public: PublicKey(public),
        }
    }

    /// Rebuild a pair from a persisted secret key; the public half is derived.
    pub fn from_secret_hex(s: &str) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_hex(s)?;
        let public = PublicKey(XPublicKey::from(secret.inner()));
        Ok(Self { secret, public })
    }
}

fn decode_key(s: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = hex::decode(s)
        .map_err(|e| CryptoError::InvalidKey(format!("not valid hex: {}", e)))?;
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("expected {} bytes", KEY_LEN))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_roundtrip_hex() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&pair.secret.to_hex()).unwrap();
        assert_eq!(pair.public.to_hex(), restored.public.to_hex());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pair = KeyPair::generate();
        let restored = PublicKey::from_hex(&pair.public.to_hex()).unwrap();
        assert_eq!(pair.public, restored);
    }

    #[test]
    fn rejects_malformed_key_material() {
        assert!(PublicKey::from_hex("zz").is_err());
        assert!(PublicKey::from_hex("ab12").is_err()); // too short
        assert!(SecretKey::from_hex(&"00".repeat(31)).is_err());
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let pair = KeyPair::generate();
        assert_eq!(format!("{:?}", pair.secret), "SecretKey(..)");
    }

    #[test]
    fn distinct_pairs() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
    }
}
