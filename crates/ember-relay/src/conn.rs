//! Per-connection handling: read frames, register, forward.
//!
//! The relay never interprets payloads beyond the envelope's `type` and
//! `to`. Forwarded frames carry the sender's exact payload bytes; nothing
//! is re-serialized on the way through. A malformed envelope is dropped
//! and the connection lives on; only a broken frame boundary (oversized
//! length prefix) closes the connection, since framing cannot recover.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ember_protocol::codec::{decode_envelope, frame_payload, try_decode_frame};
use ember_protocol::{Envelope, Identity};

use crate::directory::{Binding, Directory};

/// Outbound frames queued per connection before best-effort drop kicks in.
const WRITER_QUEUE_DEPTH: usize = 64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle one accepted TCP connection until EOF or error.
pub async fn handle_connection(stream: TcpStream, directory: Arc<Directory>) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    info!(conn_id, peer = %peer, "new connection");

    let (mut read_half, mut write_half) = stream.into_split();

    // Writer task: drains the queue this connection's Binding feeds.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(WRITER_QUEUE_DEPTH);
    let writer = tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if let Err(e) = write_half.write_all(&data).await {
                debug!("write error: {}", e);
                break;
            }
        }
    });

    let mut registered: Option<Identity> = None;
    let mut buf = BytesMut::with_capacity(4096);

    'read: loop {
        match read_half.read_buf(&mut buf).await {
            Ok(0) => {
                info!(conn_id, "connection closed (EOF)");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id, "read error: {}", e);
                break;
            }
        }

        loop {
            match try_decode_frame(&mut buf) {
                Ok(Some(payload)) => {
                    handle_frame(&payload, conn_id, &tx, &directory, &mut registered);
                }
                Ok(None) => break, // need more data
                Err(e) => {
                    warn!(conn_id, "unrecoverable framing error, closing: {}", e);
                    break 'read;
                }
            }
        }
    }

    if let Some(identity) = registered {
        directory.unregister(&identity, conn_id);
    }
    writer.abort();
}

/// Dispatch one decoded frame. Malformed payloads are logged and dropped;
/// a single client's garbage never disturbs other sessions.
fn handle_frame(
    payload: &[u8],
    conn_id: u64,
    tx: &mpsc::Sender<Vec<u8>>,
    directory: &Directory,
    registered: &mut Option<Identity>,
) {
    let envelope = match decode_envelope(payload) {
        Ok(env) => env,
        Err(e) => {
            warn!(conn_id, "dropping malformed envelope: {}", e);
            return;
        }
    };

    match envelope {
        Envelope::Register { from } => {
            // A connection asserting a new identity gives up its old one.
            if let Some(prev) = registered.replace(from.clone()) {
                if prev != from {
                    directory.unregister(&prev, conn_id);
                }
            }
            directory.register(
                from,
                Binding {
                    conn_id,
                    tx: tx.clone(),
                },
            );
        }
        env => {
            // recipient() is Some for every non-Register kind.
            if let Some(to) = env.recipient() {
                directory.route(to, frame_payload(payload));
            }
        }
    }
}
