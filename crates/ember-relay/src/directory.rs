//! The identity directory: the relay's only state.
//!
//! One concurrent map from identity to the live connection that currently
//! owns it. Identities are self-asserted; a later `register` for the same
//! identity displaces the earlier binding (last writer wins; the relay
//! performs no authentication). Invariant: after any sequence of
//! registers and unregisters, each identity maps to exactly the newest
//! binding that has not been unregistered by its own connection.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ember_protocol::Identity;

/// A live connection's routing endpoint.
#[derive(Clone)]
pub struct Binding {
    /// Unique per accepted connection; guards stale unregisters.
    pub conn_id: u64,
    /// Feeds encoded frames to the connection's writer task.
    pub tx: mpsc::Sender<Vec<u8>>,
}

#[derive(Default)]
pub struct Directory {
    bindings: DashMap<Identity, Binding>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to a connection, displacing any prior binding.
    pub fn register(&self, identity: Identity, binding: Binding) {
        let conn_id = binding.conn_id;
        if let Some(prev) = self.bindings.insert(identity.clone(), binding) {
            if prev.conn_id != conn_id {
                info!(%identity, old_conn = prev.conn_id, new_conn = conn_id,
                    "identity re-registered from a new connection");
            }
        } else {
            info!(%identity, conn_id, "identity registered");
        }
    }

    /// Forward an already-encoded frame to whichever connection owns `to`.
    ///
    /// Best-effort and non-blocking: an unknown recipient or a backpressured
    /// writer drops the frame. Returns whether the frame was handed off.
    pub fn route(&self, to: &Identity, frame: Vec<u8>) -> bool {
        match self.bindings.get(to) {
            Some(binding) => match binding.tx.try_send(frame) {
                Ok(()) => true,
                Err(_) => {
                    debug!(%to, "recipient writer full or gone, dropping frame");
                    false
                }
            },
            None => {
                debug!(%to, "no session for recipient, dropping frame");
                false
            }
        }
    }

    /// Remove the binding for `identity`, but only if `conn_id` still owns
    /// it. A connection that was displaced by a newer `register` must not
    /// tear down its successor's binding on the way out.
    pub fn unregister(&self, identity: &Identity, conn_id: u64) {
        if self
            .bindings
            .remove_if(identity, |_, b| b.conn_id == conn_id)
            .is_some()
        {
            info!(%identity, conn_id, "identity unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
