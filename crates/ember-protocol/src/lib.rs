//! Ember wire protocol — envelope types, identities, and the frame codec.
//!
//! Everything that crosses the relay is an [`Envelope`]: a closed tagged
//! union over the five message kinds, serialized as one JSON object per
//! length-prefixed frame. The relay inspects only `type` and `to`; all
//! payloads (public keys, ciphertext) are opaque to it.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod identity;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use identity::Identity;
