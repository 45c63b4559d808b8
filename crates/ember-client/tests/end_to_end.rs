//! Full-stack exercise: a real relay on a loopback socket, two endpoints
//! with real transports, handshake then an encrypted message. The relay
//! never holds key material, so delivery proves blind forwarding works.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use ember_client::endpoint::{self, Command, Event};
use ember_client::storage::MemoryStore;
use ember_client::{EndpointHandle, Identity, ReadBody, Session, Transport};
use ember_relay::Directory;

const WAIT: Duration = Duration::from_secs(10);

struct Peer {
    handle: EndpointHandle,
    transport: Transport,
    identity: Identity,
}

async fn start_peer(name: &str, relay_addr: &str) -> Peer {
    let session = Session::create(name, Box::new(MemoryStore::new()))
        .await
        .unwrap();
    let identity = session.identity().clone();

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let transport = Transport::spawn_with_delay(
        relay_addr.to_string(),
        identity.clone(),
        inbound_tx,
        Duration::from_millis(100),
    );
    let handle = endpoint::spawn(session, transport.clone(), inbound_rx);

    Peer {
        handle,
        transport,
        identity,
    }
}

async fn wait_connected(peer: &Peer) {
    timeout(WAIT, async {
        while !peer.transport.is_connected() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("transport never connected");
}

async fn next_event(peer: &mut Peer) -> Event {
    timeout(WAIT, peer.handle.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn handshake_and_message_through_a_real_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(ember_relay::serve(listener, Arc::new(Directory::new())));

    let mut alice = start_peer("alice", &relay_addr).await;
    let mut bob = start_peer("bob", &relay_addr).await;
    wait_connected(&alice).await;
    wait_connected(&bob).await;

    // Alice invites; bob sees the invitation come through the relay.
    alice
        .handle
        .commands
        .send(Command::Invite(bob.identity.clone()))
        .await
        .unwrap();
    match next_event(&mut bob).await {
        Event::Invitation(from) => assert_eq!(from, alice.identity),
        other => panic!("expected invitation, got {:?}", other),
    }

    // Bob accepts; both sides report an established channel.
    bob.handle
        .commands
        .send(Command::Accept(alice.identity.clone()))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut bob).await, Event::Established(_)));
    assert!(matches!(next_event(&mut alice).await, Event::Established(_)));

    // An encrypted message travels relay-blind end to end.
    alice
        .handle
        .commands
        .send(Command::Send {
            to: bob.identity.clone(),
            text: "hello over the wire".into(),
        })
        .await
        .unwrap();
    assert!(matches!(next_event(&mut alice).await, Event::Sent { .. }));
    match next_event(&mut bob).await {
        Event::MessageReceived { from } => assert_eq!(from, alice.identity),
        other => panic!("expected message, got {:?}", other),
    }

    // And decrypts on read.
    bob.handle
        .commands
        .send(Command::Read(alice.identity.clone()))
        .await
        .unwrap();
    match next_event(&mut bob).await {
        Event::History { entries, .. } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(
                entries[0].body,
                ReadBody::Plaintext("hello over the wire".into())
            );
        }
        other => panic!("expected history, got {:?}", other),
    }
}

#[tokio::test]
async fn late_arrival_registers_and_routes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(ember_relay::serve(listener, Arc::new(Directory::new())));

    // Bob registers first; alice connects later and her request still
    // finds bob's binding.
    let mut bob = start_peer("bob", &relay_addr).await;
    wait_connected(&bob).await;
    let mut alice = start_peer("alice", &relay_addr).await;
    wait_connected(&alice).await;

    alice
        .handle
        .commands
        .send(Command::Invite(bob.identity.clone()))
        .await
        .unwrap();
    match next_event(&mut bob).await {
        Event::Invitation(from) => assert_eq!(from, alice.identity),
        other => panic!("expected invitation, got {:?}", other),
    }
}
