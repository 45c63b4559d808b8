//! The blind relay: maps self-asserted identities to live connections and
//! forwards envelopes verbatim between them.
//!
//! The relay holds no durable state, queues nothing for offline peers, and
//! never inspects payloads. Delivery is best-effort at-most-once: if the
//! recipient is not connected (or its writer is backpressured), the frame
//! is dropped without telling anyone.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::error;

pub mod config;
pub mod conn;
pub mod directory;

pub use config::RelayConfig;
pub use directory::Directory;

/// Accept connections forever, one task per client.
pub async fn serve(listener: TcpListener, directory: Arc<Directory>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(conn::handle_connection(stream, directory.clone()));
            }
            Err(e) => {
                error!("accept error: {}", e);
            }
        }
    }
}
