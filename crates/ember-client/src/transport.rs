//! The reconnecting relay link.
//!
//! One logical connection per endpoint. On every (re)connect the first
//! frame out is `register{from}`; on loss the task sleeps a fixed delay
//! and tries again forever — no backoff growth, no retry cap, no
//! "permanently disconnected" state. Outbound envelopes are dropped, not
//! queued, while the link is down; a malformed inbound frame is skipped
//! without tearing the connection down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ember_protocol::codec::{decode_envelope, encode_envelope, try_decode_frame};
use ember_protocol::{Envelope, Identity};

/// Fixed pause between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Outbound envelopes buffered while the writer catches up.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Handle for pushing envelopes toward the relay.
#[derive(Clone)]
pub struct Transport {
    tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
}

impl Transport {
    /// Spawn the connection task with the default reconnect delay.
    pub fn spawn(
        relay_addr: String,
        identity: Identity,
        inbound: mpsc::Sender<Envelope>,
    ) -> Transport {
        Self::spawn_with_delay(relay_addr, identity, inbound, RECONNECT_DELAY)
    }

    /// As [`Transport::spawn`], with an explicit reconnect delay.
    pub fn spawn_with_delay(
        relay_addr: String,
        identity: Identity,
        inbound: mpsc::Sender<Envelope>,
        delay: Duration,
    ) -> Transport {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(false));
        tokio::spawn(run(
            relay_addr,
            identity,
            inbound,
            rx,
            connected.clone(),
            delay,
        ));
        Transport { tx, connected }
    }

    /// A transport that writes straight into a channel, for in-process
    /// wiring and tests.
    pub fn direct(tx: mpsc::Sender<Envelope>) -> Transport {
        Transport {
            tx,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Best-effort send. Dropped (never queued for later) when the link is
    /// down or the writer is saturated; callers must not assume delivery.
    pub fn send(&self, envelope: Envelope) {
        if !self.is_connected() {
            warn!(kind = envelope.kind(), "transport down, dropping outbound envelope");
            return;
        }
        if self.tx.try_send(envelope).is_err() {
            warn!("outbound queue full or closed, dropping envelope");
        }
    }
}

enum Exit {
    /// The TCP link died; reconnect after the delay.
    ConnectionLost,
    /// The endpoint went away; stop the task for good.
    Shutdown,
}

async fn run(
    relay_addr: String,
    identity: Identity,
    inbound: mpsc::Sender<Envelope>,
    mut outbound: mpsc::Receiver<Envelope>,
    connected: Arc<AtomicBool>,
    delay: Duration,
) {
    loop {
        let stream = match TcpStream::connect(&relay_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("relay connect failed: {} — retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        info!(%identity, relay = %relay_addr, "connected to relay");
        connected.store(true, Ordering::Relaxed);

        let exit = drive(stream, &identity, &inbound, &mut outbound).await;
        connected.store(false, Ordering::Relaxed);

        match exit {
            Exit::Shutdown => return,
            Exit::ConnectionLost => {
                warn!("lost connection to relay — reconnecting in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Service one live connection until it breaks or the endpoint shuts down.
async fn drive(
    stream: TcpStream,
    identity: &Identity,
    inbound: &mpsc::Sender<Envelope>,
    outbound: &mut mpsc::Receiver<Envelope>,
) -> Exit {
    let (mut read_half, mut write_half) = stream.into_split();

    // Claim our identity before anything else can be routed to us.
    let register = Envelope::Register {
        from: identity.clone(),
    };
    match encode_envelope(&register) {
        Ok(frame) => {
            if write_half.write_all(&frame).await.is_err() {
                return Exit::ConnectionLost;
            }
        }
        Err(e) => {
            error!("failed to encode register envelope: {}", e);
            return Exit::Shutdown;
        }
    }

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            maybe_env = outbound.recv() => {
                let Some(envelope) = maybe_env else {
                    // All Transport handles dropped.
                    return Exit::Shutdown;
                };
                match encode_envelope(&envelope) {
                    Ok(frame) => {
                        if write_half.write_all(&frame).await.is_err() {
                            return Exit::ConnectionLost;
                        }
                    }
                    Err(e) => warn!("failed to encode outbound envelope: {}", e),
                }
            }
            read = read_half.read_buf(&mut buf) => {
                match read {
                    Ok(0) => return Exit::ConnectionLost,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("relay read error: {}", e);
                        return Exit::ConnectionLost;
                    }
                }
                loop {
                    match try_decode_frame(&mut buf) {
                        Ok(Some(payload)) => match decode_envelope(&payload) {
                            Ok(envelope) => {
                                if inbound.send(envelope).await.is_err() {
                                    return Exit::Shutdown;
                                }
                            }
                            // One malformed frame must not kill the session.
                            Err(e) => warn!("skipping malformed inbound frame: {}", e),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!("framing desync: {} — reconnecting", e);
                            return Exit::ConnectionLost;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn id(s: &str) -> Identity {
        s.parse().unwrap()
    }

    async fn read_frame(stream: &mut TcpStream) -> Envelope {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut payload).await.unwrap();
        decode_envelope(&payload).unwrap()
    }

    #[tokio::test]
    async fn registers_immediately_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let _transport = Transport::spawn_with_delay(
            addr.to_string(),
            id("alice#0412"),
            inbound_tx,
            Duration::from_millis(50),
        );

        let (mut server_side, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let first = timeout(Duration::from_secs(5), read_frame(&mut server_side))
            .await
            .unwrap();
        assert_eq!(first, Envelope::Register { from: id("alice#0412") });
    }

    #[tokio::test]
    async fn delivers_inbound_and_outbound_envelopes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let transport = Transport::spawn_with_delay(
            addr.to_string(),
            id("alice#0412"),
            inbound_tx,
            Duration::from_millis(50),
        );

        let (mut server_side, _) = listener.accept().await.unwrap();
        let _register = read_frame(&mut server_side).await;

        // Outbound.
        let request = Envelope::Request {
            from: id("alice#0412"),
            to: id("bob#9981"),
        };
        timeout(Duration::from_secs(5), async {
            while !transport.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        transport.send(request.clone());
        let sent = timeout(Duration::from_secs(5), read_frame(&mut server_side))
            .await
            .unwrap();
        assert_eq!(sent, request);

        // Inbound, preceded by a malformed frame that must be skipped.
        let garbage = ember_protocol::codec::frame_payload(b"{\"type\":\"nope\"}");
        server_side.write_all(&garbage).await.unwrap();
        let message = Envelope::Message {
            from: id("bob#9981"),
            to: id("alice#0412"),
            ciphertext: "00ff".into(),
        };
        server_side
            .write_all(&encode_envelope(&message).unwrap())
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn reconnects_and_reregisters_after_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let transport = Transport::spawn_with_delay(
            addr.to_string(),
            id("alice#0412"),
            inbound_tx,
            Duration::from_millis(50),
        );

        // First connection: read the register, then hang up.
        let (mut first_conn, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut first_conn).await;
        drop(first_conn);

        // The transport must come back on its own and register again.
        let (mut second_conn, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("transport did not reconnect")
            .unwrap();
        let reregister = timeout(Duration::from_secs(5), read_frame(&mut second_conn))
            .await
            .unwrap();
        assert_eq!(reregister, Envelope::Register { from: id("alice#0412") });

        timeout(Duration::from_secs(5), async {
            while !transport.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn sends_while_down_are_dropped_not_queued() {
        // Point at a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let transport = Transport::spawn_with_delay(
            addr.to_string(),
            id("alice#0412"),
            inbound_tx,
            Duration::from_millis(50),
        );

        assert!(!transport.is_connected());
        // Must not panic, block, or buffer for later.
        transport.send(Envelope::Request {
            from: id("alice#0412"),
            to: id("bob#9981"),
        });
    }
}
