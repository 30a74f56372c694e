use std::net::SocketAddr;
use std::sync::Arc;

use cordlink_common::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::peers::PeerSet;
use crate::adapter::LocalSession;

/// Outbound frames buffered per peer before broadcasts to it are dropped.
const PEER_QUEUE: usize = 256;

/// Serve one peer until it closes.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    session: Arc<LocalSession>,
    peers: PeerSet,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(PEER_QUEUE);

    // Current state first, ahead of any broadcast.
    let peer_id = peers
        .register_with(tx.clone(), || {
            encode(&Envelope::connected(session.is_connected()))
        })
        .await;
    info!(peer = %addr, peer_id, "Peer attached");

    loop {
        tokio::select! {
            Some(text) = rx.recv() => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(text.as_str(), addr, &session, &tx);
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_text(text, addr, &session, &tx),
                        Err(_) => warn!(peer = %addr, "Dropping non-UTF-8 frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(peer = %addr, error = %e, "Peer read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    peers.unregister(peer_id).await;
    info!(peer = %addr, peer_id, "Peer detached");
}

fn handle_text(
    text: &str,
    addr: SocketAddr,
    session: &Arc<LocalSession>,
    reply_tx: &mpsc::Sender<String>,
) {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(peer = %addr, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match envelope {
        // Outcome reaches every peer as a ready or error event.
        Envelope::Login { params } => {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                let _ = session.login(params).await;
            });
        }
        Envelope::Command { id, method, params } => {
            let session = Arc::clone(session);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let outcome = session.execute(&method, &params).await;
                if let Err(e) = &outcome {
                    debug!(id = %id, method = %method, error = %e, "Command failed");
                }
                let Some(json) = encode(&Envelope::response(id, outcome)) else {
                    return;
                };
                if reply_tx.send(json).await.is_err() {
                    debug!("Peer left before its response was ready");
                }
            });
        }
        other => {
            warn!(peer = %addr, kind = other.kind(), "Ignoring unexpected envelope from peer");
        }
    }
}

fn encode(envelope: &Envelope) -> Option<String> {
    match envelope.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(kind = envelope.kind(), error = %e, "Failed to encode envelope");
            None
        }
    }
}
