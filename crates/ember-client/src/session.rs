//! The session: root of the local ownership graph.
//!
//! Owns the identity, key pair, absolute expiry, contact book, and ledger,
//! all backed by one [`Store`]. Wiping the session destroys everything at
//! once; there is no partial teardown and no renewal.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{info, warn};

use ember_crypto::{KeyPair, PublicKey, SecretKey};
use ember_protocol::identity::validate_name;
use ember_protocol::Identity;

use crate::error::ClientError;
use crate::handshake::{ContactBook, StoredContact};
use crate::ledger::{Ledger, ReadEntry};
use crate::storage::{
    Store, KEY_CONTACTS, KEY_IDENTITY, KEY_MESSAGES, KEY_PRIV_KEY, KEY_PUB_KEY,
    KEY_SESSION_EXPIRY,
};

/// Fixed session lifetime from identity creation. No renewal.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// How often the endpoint polls the expiry timestamp.
pub const TTL_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Session {
    identity: Identity,
    keys: KeyPair,
    expiry_ms: u64,
    pub contacts: ContactBook,
    pub ledger: Ledger,
    store: Box<dyn Store>,
}

impl Session {
    /// Create a fresh session: random discriminator, new key pair, expiry
    /// one [`SESSION_TTL`] out. Key generation runs on the blocking pool so
    /// the caller's task keeps servicing its other work.
    pub async fn create(name: &str, store: Box<dyn Store>) -> Result<Self, ClientError> {
        Self::create_with_ttl(name, store, SESSION_TTL).await
    }

    pub(crate) async fn create_with_ttl(
        name: &str,
        mut store: Box<dyn Store>,
        ttl: Duration,
    ) -> Result<Self, ClientError> {
        validate_name(name)?;
        let discriminator: u16 = rand::thread_rng().gen_range(0..10_000);
        let identity = Identity::new(name, discriminator)?;

        let keys = tokio::task::spawn_blocking(KeyPair::generate)
            .await
            .map_err(|e| ClientError::TaskJoin(e.to_string()))?;

        let expiry_ms = now_ms() + ttl.as_millis() as u64;

        store.set(KEY_IDENTITY, identity.to_string());
        store.set(KEY_PRIV_KEY, keys.secret.to_hex());
        store.set(KEY_PUB_KEY, keys.public.to_hex());
        store.set(KEY_SESSION_EXPIRY, expiry_ms.to_string());
        store.set(KEY_CONTACTS, "{}".into());
        store.set(KEY_MESSAGES, "{}".into());

        info!(%identity, expiry_ms, "session created");

        Ok(Self {
            contacts: ContactBook::new(identity.clone()),
            ledger: Ledger::new(),
            identity,
            keys,
            expiry_ms,
            store,
        })
    }

    /// Rebuild a session from persisted state. Returns `Ok(None)` when no
    /// usable session exists (first run, or a wipe happened).
    pub fn resume(store: Box<dyn Store>) -> Result<Option<Self>, ClientError> {
        let (Some(identity), Some(priv_hex), Some(expiry)) = (
            store.get(KEY_IDENTITY),
            store.get(KEY_PRIV_KEY),
            store.get(KEY_SESSION_EXPIRY),
        ) else {
            return Ok(None);
        };

        let identity: Identity = identity.parse()?;
        let keys = KeyPair::from_secret_hex(&priv_hex)?;
        let expiry_ms: u64 = expiry
            .parse()
            .map_err(|_| ClientError::Storage("unparseable session_expiry".into()))?;

        let contacts = match store.get(KEY_CONTACTS) {
            Some(json) => {
                let stored: HashMap<Identity, StoredContact> = serde_json::from_str(&json)
                    .map_err(|e| ClientError::Storage(format!("corrupt contacts: {}", e)))?;
                ContactBook::from_stored(identity.clone(), stored)
            }
            None => ContactBook::new(identity.clone()),
        };

        let ledger = match store.get(KEY_MESSAGES) {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| ClientError::Storage(format!("corrupt messages: {}", e)))?,
            None => Ledger::new(),
        };

        info!(%identity, "session resumed");

        Ok(Some(Self {
            identity,
            keys,
            expiry_ms,
            contacts,
            ledger,
            store,
        }))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keys.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.keys.secret
    }

    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Absolute-timestamp check; the TTL poll calls this every tick.
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms > self.expiry_ms
    }

    /// Write the contact book through to the store.
    pub fn persist_contacts(&mut self) {
        match serde_json::to_string(&self.contacts.to_stored()) {
            Ok(json) => self.store.set(KEY_CONTACTS, json),
            Err(e) => warn!("failed to serialize contacts: {}", e),
        }
    }

    /// Write the ledger through to the store.
    pub fn persist_messages(&mut self) {
        match serde_json::to_string(&self.ledger) {
            Ok(json) => self.store.set(KEY_MESSAGES, json),
            Err(e) => warn!("failed to serialize messages: {}", e),
        }
    }

    /// Decrypt-on-read view of one contact's history.
    pub fn read_history(&self, contact: &Identity) -> Vec<ReadEntry> {
        self.ledger.read(contact, &self.keys.secret)
    }

    /// Irreversibly destroy identity, keys, contacts, and messages.
    /// Idempotent: wiping twice is harmless.
    pub fn wipe(&mut self) {
        self.contacts.wipe();
        self.ledger.wipe();
        self.store.clear();
        info!(identity = %self.identity, "session wiped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::HandshakeState;
    use crate::ledger::ReadBody;
    use crate::storage::{FileStore, MemoryStore};
    use ember_crypto::seal;

    fn id(s: &str) -> Identity {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn create_sets_all_keys_and_identity_format() {
        let session = Session::create("alice", Box::new(MemoryStore::new()))
            .await
            .unwrap();
        let identity = session.identity();
        assert_eq!(identity.name(), "alice");
        assert_eq!(identity.discriminator().len(), 4);
        assert!(session.expiry_ms() > now_ms());
        assert!(!session.expired(now_ms()));
    }

    #[tokio::test]
    async fn create_rejects_invalid_names() {
        assert!(Session::create("ab", Box::new(MemoryStore::new()))
            .await
            .is_err());
        assert!(Session::create("Bad Name", Box::new(MemoryStore::new()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn resume_restores_identity_keys_and_history() {
        let path = std::env::temp_dir().join(format!(
            "ember-session-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let (identity, pub_hex) = {
            let mut session = Session::create("alice", Box::new(FileStore::open(&path)))
                .await
                .unwrap();
            session.contacts.on_request(id("bob#9981"));
            session.ledger.append_sent(&id("bob#9981"), "hi".into(), 7);
            session.persist_contacts();
            session.persist_messages();
            (session.identity().clone(), session.public_key().to_hex())
        };

        let resumed = Session::resume(Box::new(FileStore::open(&path)))
            .unwrap()
            .expect("persisted session should resume");
        assert_eq!(resumed.identity(), &identity);
        assert_eq!(resumed.public_key().to_hex(), pub_hex);
        assert_eq!(
            resumed.contacts.state(&id("bob#9981")),
            HandshakeState::RequestReceived
        );
        assert_eq!(resumed.read_history(&id("bob#9981")).len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn resume_works_before_any_contact_or_message() {
        let path = std::env::temp_dir().join(format!(
            "ember-session-fresh-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        // Only the seed documents, never persisted again.
        let identity = Session::create("carol", Box::new(FileStore::open(&path)))
            .await
            .unwrap()
            .identity()
            .clone();

        let resumed = Session::resume(Box::new(FileStore::open(&path)))
            .unwrap()
            .expect("fresh session should resume");
        assert_eq!(resumed.identity(), &identity);
        assert!(resumed.ledger.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn expired_is_a_strict_threshold() {
        let session = Session::create_with_ttl(
            "alice",
            Box::new(MemoryStore::new()),
            Duration::from_millis(0),
        )
        .await
        .unwrap();
        assert!(session.expired(session.expiry_ms() + 1));
        assert!(!session.expired(session.expiry_ms()));
    }

    #[tokio::test]
    async fn wipe_erases_everything_and_is_idempotent() {
        let mut session = Session::create("alice", Box::new(MemoryStore::new()))
            .await
            .unwrap();
        let ciphertext = seal("hello", session.public_key()).unwrap();
        session.ledger.append_received(&id("bob#9981"), ciphertext, 1);
        session.contacts.on_request(id("bob#9981"));

        session.wipe();
        assert!(session.ledger.is_empty());
        assert_eq!(session.contacts.state(&id("bob#9981")), HandshakeState::None);
        session.wipe(); // second wipe must not panic

        // A resume from the cleared store finds nothing.
        let mut cleared = MemoryStore::new();
        cleared.clear();
        assert!(Session::resume(Box::new(cleared)).unwrap().is_none());
    }

    #[tokio::test]
    async fn history_read_decrypts_peer_entries() {
        let mut session = Session::create("alice", Box::new(MemoryStore::new()))
            .await
            .unwrap();
        let ciphertext = seal("from bob", session.public_key()).unwrap();
        session.ledger.append_received(&id("bob#9981"), ciphertext, 5);
        session.ledger.append_sent(&id("bob#9981"), "to bob".into(), 6);

        let entries = session.read_history(&id("bob#9981"));
        assert_eq!(entries[0].body, ReadBody::Plaintext("from bob".into()));
        assert_eq!(entries[1].body, ReadBody::Plaintext("to bob".into()));
    }
}
