//! The per-contact message ledger.
//!
//! Append-only within one session. Received bodies stay ciphertext at rest
//! and are decrypted on read; locally-authored bodies stay plaintext. One
//! undecryptable entry becomes a sentinel and never hides the rest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ember_crypto::{open, SecretKey};
use ember_protocol::Identity;

/// Who authored a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    Own,
    Peer,
}

/// One message at rest. `body` is plaintext for `Own`, ciphertext for `Peer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub body: String,
    pub author: Author,
    pub timestamp_ms: u64,
}

/// A decrypted view of one entry, produced by [`Ledger::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    pub author: Author,
    pub body: ReadBody,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadBody {
    Plaintext(String),
    /// Wrong key or corrupted ciphertext; the entry is kept in place so
    /// ordering survives.
    Undecryptable,
}

/// All message history for one endpoint, keyed by contact.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    // default so a freshly-seeded `{}` document deserializes empty
    #[serde(default)]
    entries: HashMap<Identity, Vec<LedgerEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally-authored message; body is the plaintext.
    pub fn append_sent(&mut self, contact: &Identity, plaintext: String, timestamp_ms: u64) {
        self.entries
            .entry(contact.clone())
            .or_default()
            .push(LedgerEntry {
                body: plaintext,
                author: Author::Own,
                timestamp_ms,
            });
    }

    /// Append a received message; body is the ciphertext, untouched.
    pub fn append_received(&mut self, contact: &Identity, ciphertext: String, timestamp_ms: u64) {
        self.entries
            .entry(contact.clone())
            .or_default()
            .push(LedgerEntry {
                body: ciphertext,
                author: Author::Peer,
                timestamp_ms,
            });
    }

    /// Reproduce the ordered history for `contact`, decrypting peer entries
    /// with `secret`. Decryption failures are isolated per entry.
    pub fn read(&self, contact: &Identity, secret: &SecretKey) -> Vec<ReadEntry> {
        let Some(entries) = self.entries.get(contact) else {
            return Vec::new();
        };
        entries
            .iter()
            .map(|entry| {
                let body = match entry.author {
                    Author::Own => ReadBody::Plaintext(entry.body.clone()),
                    Author::Peer => match open(&entry.body, secret) {
                        Ok(plaintext) => ReadBody::Plaintext(plaintext),
                        Err(_) => ReadBody::Undecryptable,
                    },
                };
                ReadEntry {
                    author: entry.author,
                    body,
                    timestamp_ms: entry.timestamp_ms,
                }
            })
            .collect()
    }

    /// Destroy all history. Idempotent.
    pub fn wipe(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
