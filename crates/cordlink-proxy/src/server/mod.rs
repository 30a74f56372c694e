//! WebSocket relay over the shared local session.

mod connection;
mod peers;


use std::sync::Arc;
use std::time::Duration;

use cordlink_common::SessionEvent;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use connection::handle_connection;
pub use peers::{PeerId, PeerSet};

use crate::adapter::LocalSession;

/// Pause after a failed accept. Errors like EMFILE persist until a peer
/// leaves, and retrying at once would spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct ProxyServer {
    session: Arc<LocalSession>,
    peers: PeerSet,
}

impl ProxyServer {
    pub fn new(session: Arc<LocalSession>) -> Self {
        Self {
            session,
            peers: PeerSet::new(),
        }
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Accept peers on `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Relay listening");
        }

        let fan_out = tokio::spawn(fan_out(self.session.subscribe(), self.peers.clone()));
        let _guard = AbortOnDrop(fan_out);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let session = Arc::clone(&self.session);
            let peers = self.peers.clone();
            tokio::spawn(async move {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => handle_connection(ws, addr, session, peers).await,
                    Err(e) => debug!(peer = %addr, error = %e, "WebSocket handshake failed"),
                }
            });
        }
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Broadcast every session event to every attached peer.
async fn fan_out(mut events: broadcast::Receiver<SessionEvent>, peers: PeerSet) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Broadcast lagged behind session events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let envelope = event.to_envelope();
        match envelope.to_json() {
            Ok(json) => {
                let delivered = peers.broadcast(&json).await;
                debug!(kind = envelope.kind(), delivered, "Broadcast");
            }
            Err(e) => warn!(error = %e, "Failed to encode session event"),
        }
    }
}
