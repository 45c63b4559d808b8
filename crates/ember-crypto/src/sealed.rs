//! The sealed-box transform: anonymous public-key encryption.
//!
//! Blob layout (before hex encoding):
//! `[ephemeral public key (32)] [nonce (12)] [AES-256-GCM ciphertext + tag]`
//!
//! The AEAD key is HKDF-SHA256 over the ephemeral ECDH shared secret, with
//! the ephemeral public key as salt, so the derived key is unique per blob.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as XPublicKey};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::{PublicKey, SecretKey, KEY_LEN};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_INFO: &[u8] = b"ember-sealed-box-v1";

/// Encrypt `plaintext` so that only the holder of the private key matching
/// `recipient` can read it.
pub fn seal(plaintext: &str, recipient: &PublicKey) -> Result<String, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = XPublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient.inner());

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::Rng)?;

    let mut in_out = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(KEY_LEN + NONCE_LEN + in_out.len());
    blob.extend_from_slice(ephemeral_pub.as_bytes());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);

    Ok(hex::encode(blob))
}

/// Decrypt a sealed blob with the owner's private key.
///
/// Any failure — bad hex, truncated blob, wrong key, tampered ciphertext —
/// collapses to [`CryptoError::DecryptionFailed`]; callers learn nothing
/// about which stage rejected the input.
pub fn open(blob: &str, own: &SecretKey) -> Result<String, CryptoError> {
    let bytes = hex::decode(blob).map_err(|_| CryptoError::DecryptionFailed)?;
    if bytes.len() < KEY_LEN + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }

    let ephemeral_pub: [u8; KEY_LEN] = bytes[..KEY_LEN]
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let ephemeral_pub = XPublicKey::from(ephemeral_pub);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&bytes[KEY_LEN..KEY_LEN + NONCE_LEN]);

    let shared = own.inner().diffie_hellman(&ephemeral_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut ciphertext = bytes[KEY_LEN + NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
}

fn derive_key(ikm: &[u8], salt: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(KEY_INFO, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    let unbound = UnboundKey::new(&AES_256_GCM, &okm).map_err(|_| CryptoError::KeyDerivation)?;
    okm.zeroize();
    Ok(LessSafeKey::new(unbound))
}
