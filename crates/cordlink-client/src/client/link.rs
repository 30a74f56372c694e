use std::sync::Weak;
use std::sync::atomic::Ordering;

use cordlink_common::{Envelope, LoginParams, RelayError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{lock, Inner};
use crate::events::{ClientEvent, ConnectionState};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

enum LinkEnd {
    /// Teardown asked us to close.
    Closed,
    Lost(String),
}

/// Drive one link attempt from connect to close, then schedule the next.
///
/// Only a weak handle is held so dropping the last `RelayClient` closes
/// the link.
pub(super) async fn run(weak: Weak<Inner>) {
    let url = match weak.upgrade() {
        Some(inner) => inner.config.ws_url(),
        None => return,
    };
    info!(url = %url, "Connecting to proxy");

    let end = match connect_async(url.as_str()).await {
        Ok((ws, _)) => session(&weak, ws).await,
        Err(e) => {
            let err = RelayError::Transport(format!("connect failed: {e}"));
            if let Some(inner) = weak.upgrade() {
                inner.events.publish(ClientEvent::LinkError(err.clone()));
            }
            LinkEnd::Lost(err.to_string())
        }
    };

    let Some(inner) = weak.upgrade() else {
        return;
    };
    lock(&inner.outbound).take();

    // State settles before LinkDown goes out.
    match end {
        LinkEnd::Closed => info!("Link to proxy closed"),
        LinkEnd::Lost(reason) => {
            warn!(reason = %reason, "Link to proxy lost");
            if !inner.schedule_reconnect() {
                inner.state.send_replace(ConnectionState::Idle);
            }
        }
    }
    inner.events.publish(ClientEvent::LinkDown);
}

async fn session(weak: &Weak<Inner>, ws: Socket) -> LinkEnd {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    {
        let Some(inner) = weak.upgrade() else {
            return LinkEnd::Closed;
        };
        if inner.closed.load(Ordering::SeqCst) {
            let _ = sink.send(Message::Close(None)).await;
            return LinkEnd::Closed;
        }
        *lock(&inner.outbound) = Some(tx);

        inner.state.send_replace(ConnectionState::Connected);
        info!("Connected to proxy");
        inner.events.publish(ClientEvent::LinkUp);

        // Fire and forget; the outcome arrives as a ready or error event.
        inner.send(&Envelope::Login {
            params: LoginParams {
                access_token: inner.config.access_token.clone(),
                refresh_token: inner.config.refresh_token.clone(),
            },
        });
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        return LinkEnd::Lost(format!("send failed: {e}"));
                    }
                }
                // Sender dropped by teardown or by the client going away.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return LinkEnd::Closed;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(text.as_str());
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return LinkEnd::Lost("closed by proxy".into());
                }
                Some(Err(e)) => {
                    if let Some(inner) = weak.upgrade() {
                        inner
                            .events
                            .publish(ClientEvent::LinkError(RelayError::Transport(e.to_string())));
                    }
                    return LinkEnd::Lost(e.to_string());
                }
                Some(Ok(other)) => debug!(?other, "Ignoring non-text frame"),
            },
        }
    }
}
