//! The endpoint actor: one task owning all per-contact state.
//!
//! Inbound envelopes, local commands, and the TTL poll are multiplexed
//! onto a single loop, so handshake transitions and ledger appends are
//! serialized by construction — no contact record is ever touched from
//! two places at once. Sealing and opening are sub-millisecond local
//! operations and run inline, which keeps same-contact operations applied
//! in the order they were initiated.

use tokio::sync::mpsc;
use tracing::debug;

use ember_crypto::seal;
use ember_protocol::{Envelope, Identity};

use crate::handshake::{HandshakeAction, HandshakeState};
use crate::ledger::ReadEntry;
use crate::session::{now_ms, Session, TTL_POLL_INTERVAL};
use crate::transport::Transport;

/// A local user action, fed to the actor.
#[derive(Debug)]
pub enum Command {
    /// Start a handshake with a peer.
    Invite(Identity),
    /// Accept a pending invitation.
    Accept(Identity),
    /// Encrypt and send a chat message to an established contact.
    Send { to: Identity, text: String },
    /// Produce the decrypted history for one contact.
    Read(Identity),
    /// Produce the current contact list.
    Contacts,
    /// Destroy the session immediately.
    Wipe,
    /// Stop the actor without wiping.
    Shutdown,
}

/// What the actor reports back to the presentation layer.
#[derive(Debug)]
pub enum Event {
    /// A peer wants to chat; exactly one per pending invitation.
    Invitation(Identity),
    /// The handshake with this peer completed.
    Established(Identity),
    /// An encrypted message arrived and was appended to the ledger.
    MessageReceived { from: Identity },
    /// A message was sealed, sent, and recorded.
    Sent { to: Identity },
    /// Response to [`Command::Read`].
    History {
        contact: Identity,
        entries: Vec<ReadEntry>,
    },
    /// Response to [`Command::Contacts`].
    ContactList(Vec<(Identity, HandshakeState)>),
    /// The session was destroyed (TTL expiry or explicit wipe).
    Wiped,
    /// A command was rejected locally, before any protocol action.
    Error(String),
}

/// Channel ends the presentation layer holds.
pub struct EndpointHandle {
    pub commands: mpsc::Sender<Command>,
    pub events: mpsc::Receiver<Event>,
}

/// Spawn the actor over an owned session and transport.
pub fn spawn(
    session: Session,
    transport: Transport,
    inbound: mpsc::Receiver<Envelope>,
) -> EndpointHandle {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);
    tokio::spawn(run(
        session,
        transport,
        inbound,
        command_rx,
        event_tx,
        TTL_POLL_INTERVAL,
    ));
    EndpointHandle {
        commands: command_tx,
        events: event_rx,
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn run(
    mut session: Session,
    transport: Transport,
    mut inbound: mpsc::Receiver<Envelope>,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
    poll_interval: std::time::Duration,
) {
    let mut ttl = tokio::time::interval(poll_interval);
    ttl.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ttl.tick() => {
                if session.expired(now_ms()) {
                    // The poll fires the wipe once and never re-arms:
                    // the actor exits after this branch.
                    session.wipe();
                    let _ = events.send(Event::Wiped).await;
                    return;
                }
            }
            maybe_cmd = commands.recv() => {
                let Some(command) = maybe_cmd else { return };
                if let Flow::Stop =
                    handle_command(command, &mut session, &transport, &events).await
                {
                    return;
                }
            }
            maybe_env = inbound.recv() => {
                let Some(envelope) = maybe_env else { return };
                handle_envelope(envelope, &mut session, &transport, &events).await;
            }
        }
    }
}

async fn handle_command(
    command: Command,
    session: &mut Session,
    transport: &Transport,
    events: &mpsc::Sender<Event>,
) -> Flow {
    match command {
        Command::Invite(peer) => {
            if &peer == session.identity() {
                let _ = events
                    .send(Event::Error("you cannot invite yourself".into()))
                    .await;
                return Flow::Continue;
            }
            let actions = session.contacts.invite(peer);
            apply_actions(actions, session, transport, events).await;
        }
        Command::Accept(peer) => {
            if session.contacts.state(&peer) != HandshakeState::RequestReceived {
                let _ = events
                    .send(Event::Error(format!("no pending invitation from {}", peer)))
                    .await;
                return Flow::Continue;
            }
            let own_pub = session.public_key().clone();
            let actions = session.contacts.accept(peer, &own_pub);
            apply_actions(actions, session, transport, events).await;
        }
        Command::Send { to, text } => {
            if session.contacts.state(&to) != HandshakeState::Established {
                let _ = events
                    .send(Event::Error(format!("handshake with {} is not established", to)))
                    .await;
                return Flow::Continue;
            }
            let Some(peer_key) = session.contacts.public_key(&to).cloned() else {
                let _ = events
                    .send(Event::Error(format!("no public key for {} yet", to)))
                    .await;
                return Flow::Continue;
            };
            match seal(&text, &peer_key) {
                Ok(ciphertext) => {
                    transport.send(Envelope::Message {
                        from: session.identity().clone(),
                        to: to.clone(),
                        ciphertext,
                    });
                    session.ledger.append_sent(&to, text, now_ms());
                    session.persist_messages();
                    let _ = events.send(Event::Sent { to }).await;
                }
                Err(e) => {
                    let _ = events
                        .send(Event::Error(format!("encryption failed: {}", e)))
                        .await;
                }
            }
        }
        Command::Read(contact) => {
            let entries = session.read_history(&contact);
            let _ = events.send(Event::History { contact, entries }).await;
        }
        Command::Contacts => {
            let list = session
                .contacts
                .iter()
                .map(|(id, c)| (id.clone(), c.state))
                .collect();
            let _ = events.send(Event::ContactList(list)).await;
        }
        Command::Wipe => {
            session.wipe();
            let _ = events.send(Event::Wiped).await;
            return Flow::Stop;
        }
        Command::Shutdown => return Flow::Stop,
    }
    Flow::Continue
}

async fn handle_envelope(
    envelope: Envelope,
    session: &mut Session,
    transport: &Transport,
    events: &mpsc::Sender<Event>,
) {
    match envelope {
        Envelope::Request { from, .. } => {
            let actions = session.contacts.on_request(from);
            apply_actions(actions, session, transport, events).await;
        }
        Envelope::Accept { from, pub_key, .. } => {
            let own_pub = session.public_key().clone();
            let actions = session.contacts.on_accept(from, &pub_key, &own_pub);
            apply_actions(actions, session, transport, events).await;
        }
        Envelope::Pubkey { from, pub_key, .. } => {
            let actions = session.contacts.on_pubkey(from, &pub_key);
            apply_actions(actions, session, transport, events).await;
        }
        Envelope::Message { from, ciphertext, .. } => {
            // Ciphertext is stored as-is; decryption happens on read.
            session.ledger.append_received(&from, ciphertext, now_ms());
            session.persist_messages();
            let _ = events.send(Event::MessageReceived { from }).await;
        }
        Envelope::Register { .. } => {
            debug!("ignoring register envelope delivered to an endpoint");
        }
    }
}

async fn apply_actions(
    actions: Vec<HandshakeAction>,
    session: &mut Session,
    transport: &Transport,
    events: &mpsc::Sender<Event>,
) {
    for action in actions {
        match action {
            HandshakeAction::Send(envelope) => transport.send(envelope),
            HandshakeAction::SurfaceInvitation(peer) => {
                let _ = events.send(Event::Invitation(peer)).await;
            }
            HandshakeAction::Established(peer) => {
                let _ = events.send(Event::Established(peer)).await;
            }
        }
    }
    // Key overwrites can mutate the book without emitting actions,
    // so persist after every handshake input.
    session.persist_contacts();
}
