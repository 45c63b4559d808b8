//! The five envelope kinds that cross the relay.
//!
//! A missing field is a deserialization error, not a runtime check: each
//! variant carries exactly the fields its kind requires. `Register` is the
//! only envelope without a recipient; everything else is forwarded verbatim
//! to whichever live connection owns `to`.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// One discriminated wire message unit.
///
/// On the wire this is a JSON object whose `type` field selects the variant:
/// `{"type":"accept","from":"bob#9981","to":"alice#0412","pubKey":"..."}`.
/// `pubKey` carries a hex-encoded X25519 public key, `ciphertext` a
/// hex-encoded sealed-box blob; both are opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Bind `from` to the sending connection at the relay.
    Register { from: Identity },

    /// Initiate a handshake with `to`.
    Request { from: Identity, to: Identity },

    /// Accept a handshake, carrying the accepter's public key.
    Accept {
        from: Identity,
        to: Identity,
        #[serde(rename = "pubKey")]
        pub_key: String,
    },

    /// Complete the exchange with the initiator's public key.
    Pubkey {
        from: Identity,
        to: Identity,
        #[serde(rename = "pubKey")]
        pub_key: String,
    },

    /// An end-to-end encrypted chat message.
    Message {
        from: Identity,
        to: Identity,
        ciphertext: String,
    },
}

impl Envelope {
    /// The identity that produced this envelope.
    pub fn sender(&self) -> &Identity {
        match self {
            Envelope::Register { from }
            | Envelope::Request { from, .. }
            | Envelope::Accept { from, .. }
            | Envelope::Pubkey { from, .. }
            | Envelope::Message { from, .. } => from,
        }
    }

    /// The identity this envelope should be routed to. `None` for `Register`.
    pub fn recipient(&self) -> Option<&Identity> {
        match self {
            Envelope::Register { .. } => None,
            Envelope::Request { to, .. }
            | Envelope::Accept { to, .. }
            | Envelope::Pubkey { to, .. }
            | Envelope::Message { to, .. } => Some(to),
        }
    }

    /// The wire name of this envelope's kind, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Register { .. } => "register",
            Envelope::Request { .. } => "request",
            Envelope::Accept { .. } => "accept",
            Envelope::Pubkey { .. } => "pubkey",
            Envelope::Message { .. } => "message",
        }
    }
}
