//! Per-contact handshake state machine and contact book.
//!
//! The machine is pure: transitions consume an inbound envelope or a local
//! user action and return the side effects to perform
//! ([`HandshakeAction`]), so all I/O stays at the actor boundary and the
//! protocol logic is testable without a socket.
//!
//! Key exchange is asymmetric-then-symmetric: the accepter's key rides on
//! `accept`, the initiator's on the follow-up `pubkey`, so a peer who never
//! accepts never learns the initiator's public key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ember_crypto::PublicKey;
use ember_protocol::{Envelope, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    /// No handshake traffic yet.
    None,
    /// We invited the peer and await their `accept`.
    RequestSent,
    /// The peer invited us; the invitation is pending locally.
    RequestReceived,
    /// Mutual key trust reached. Terminal.
    Established,
}

/// Per-peer record: their key (absent until the handshake delivers it) and
/// where the handshake stands.
#[derive(Debug, Clone)]
pub struct Contact {
    pub public_key: Option<PublicKey>,
    pub state: HandshakeState,
}

/// A side effect the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Put this envelope on the wire.
    Send(Envelope),
    /// Surface a pending invitation from this peer to the user.
    SurfaceInvitation(Identity),
    /// The handshake with this peer just completed.
    Established(Identity),
}

/// Serialized form of one contact, as stored under the `contacts` key.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredContact {
    pub public_key: Option<String>,
    pub state: HandshakeState,
}

/// All per-peer handshake state for one endpoint.
pub struct ContactBook {
    own: Identity,
    contacts: HashMap<Identity, Contact>,
}

impl ContactBook {
    pub fn new(own: Identity) -> Self {
        Self {
            own,
            contacts: HashMap::new(),
        }
    }

    /// Local action: invite `peer`. Only acts from `None`; re-inviting an
    /// already-contacted peer must not duplicate outbound requests.
    pub fn invite(&mut self, peer: Identity) -> Vec<HandshakeAction> {
        let contact = self.entry(&peer);
        if contact.state != HandshakeState::None {
            debug!(%peer, state = ?contact.state, "ignoring re-invite");
            return Vec::new();
        }
        contact.state = HandshakeState::RequestSent;
        vec![HandshakeAction::Send(Envelope::Request {
            from: self.own.clone(),
            to: peer,
        })]
    }

    /// Inbound `request{from}`.
    pub fn on_request(&mut self, from: Identity) -> Vec<HandshakeAction> {
        let own = self.own.clone();
        let contact = self.entry(&from);
        match contact.state {
            HandshakeState::None => {
                contact.state = HandshakeState::RequestReceived;
                vec![HandshakeAction::SurfaceInvitation(from)]
            }
            // Duplicate request: exactly one pending invitation per peer.
            HandshakeState::RequestReceived => Vec::new(),
            // Mutual invite crossed in flight. Deterministic tie-break:
            // the lexicographically lower identity stays initiator, the
            // higher one yields and treats the inbound request normally.
            HandshakeState::RequestSent => {
                if own < from {
                    debug!(%from, "crossed invites, staying initiator");
                    Vec::new()
                } else {
                    contact.state = HandshakeState::RequestReceived;
                    vec![HandshakeAction::SurfaceInvitation(from)]
                }
            }
            HandshakeState::Established => Vec::new(),
        }
    }

    /// Local action: accept the pending invitation from `peer`, attaching
    /// our public key. Optimistically established; the peer's key arrives
    /// on the follow-up `pubkey`.
    pub fn accept(&mut self, peer: Identity, own_pub: &PublicKey) -> Vec<HandshakeAction> {
        let own = self.own.clone();
        let contact = self.entry(&peer);
        if contact.state != HandshakeState::RequestReceived {
            debug!(%peer, state = ?contact.state, "accept with no pending invitation");
            return Vec::new();
        }
        contact.state = HandshakeState::Established;
        vec![
            HandshakeAction::Send(Envelope::Accept {
                from: own,
                to: peer.clone(),
                pub_key: own_pub.to_hex(),
            }),
            HandshakeAction::Established(peer),
        ]
    }

    /// Inbound `accept{from, pubKey}`: store the peer's key and complete
    /// the mutual exchange by sending ours back.
    pub fn on_accept(
        &mut self,
        from: Identity,
        key_hex: &str,
        own_pub: &PublicKey,
    ) -> Vec<HandshakeAction> {
        let key = match PublicKey::from_hex(key_hex) {
            Ok(key) => key,
            Err(e) => {
                warn!(%from, "dropping accept with bad key: {}", e);
                return Vec::new();
            }
        };
        let own = self.own.clone();
        let contact = self.entry(&from);
        if contact.state != HandshakeState::RequestSent {
            debug!(%from, state = ?contact.state, "dropping accept with no outstanding request");
            return Vec::new();
        }
        contact.public_key = Some(key);
        contact.state = HandshakeState::Established;
        vec![
            HandshakeAction::Send(Envelope::Pubkey {
                from: own,
                to: from.clone(),
                pub_key: own_pub.to_hex(),
            }),
            HandshakeAction::Established(from),
        ]
    }

    /// Inbound `pubkey{from, pubKey}`: persist (or overwrite) the peer's key.
    pub fn on_pubkey(&mut self, from: Identity, key_hex: &str) -> Vec<HandshakeAction> {
        let key = match PublicKey::from_hex(key_hex) {
            Ok(key) => key,
            Err(e) => {
                warn!(%from, "dropping pubkey with bad key: {}", e);
                return Vec::new();
            }
        };
        let contact = self.entry(&from);
        match contact.state {
            HandshakeState::RequestReceived | HandshakeState::Established => {
                contact.public_key = Some(key);
                if contact.state != HandshakeState::Established {
                    contact.state = HandshakeState::Established;
                    vec![HandshakeAction::Established(from)]
                } else {
                    Vec::new()
                }
            }
            state => {
                debug!(%from, ?state, "dropping unexpected pubkey");
                Vec::new()
            }
        }
    }

    pub fn state(&self, peer: &Identity) -> HandshakeState {
        self.contacts
            .get(peer)
            .map(|c| c.state)
            .unwrap_or(HandshakeState::None)
    }

    pub fn public_key(&self, peer: &Identity) -> Option<&PublicKey> {
        self.contacts.get(peer).and_then(|c| c.public_key.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Contact)> {
        self.contacts.iter()
    }

    pub fn wipe(&mut self) {
        self.contacts.clear();
    }

    /// Serializable snapshot for the store.
    pub fn to_stored(&self) -> HashMap<Identity, StoredContact> {
        self.contacts
            .iter()
            .map(|(id, c)| {
                (
                    id.clone(),
                    StoredContact {
                        public_key: c.public_key.as_ref().map(|k| k.to_hex()),
                        state: c.state,
                    },
                )
            })
            .collect()
    }

    /// Rebuild from a stored snapshot; entries with corrupt key material
    /// come back key-less rather than poisoning the whole book.
    pub fn from_stored(own: Identity, stored: HashMap<Identity, StoredContact>) -> Self {
        let contacts = stored
            .into_iter()
            .map(|(id, c)| {
                let public_key = c.public_key.as_deref().and_then(|hex| {
                    PublicKey::from_hex(hex)
                        .map_err(|e| warn!(%id, "discarding stored key: {}", e))
                        .ok()
                });
                (
                    id,
                    Contact {
                        public_key,
                        state: c.state,
                    },
                )
            })
            .collect();
        Self { own, contacts }
    }

    fn entry(&mut self, peer: &Identity) -> &mut Contact {
        self.contacts.entry(peer.clone()).or_insert(Contact {
            public_key: None,
            state: HandshakeState::None,
        })
    }
}
