use cordlink_common::{Envelope, ReadyPayload, RelayError};
use serde_json::Value;

/// Lifecycle of the link to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    /// The link dropped and a reconnect is scheduled.
    Reconnecting,
}

/// What the client republishes locally.
///
/// `Link*` variants describe the network link to the proxy; `Session*` and
/// `ProxyStatus` describe the proxy's own session with the local client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    LinkUp,
    LinkDown,
    LinkError(RelayError),
    ProxyStatus { connected: bool },
    SessionReady(ReadyPayload),
    SessionDisconnected,
    SessionError(String),
    Event { name: String, data: Value },
}

impl ClientEvent {
    /// Map a server-pushed envelope. Responses and client-bound kinds
    /// have no event form.
    pub fn from_envelope(envelope: Envelope) -> Option<Self> {
        match envelope {
            Envelope::Event { event, data } => Some(ClientEvent::Event { name: event, data }),
            Envelope::Ready { data } => Some(ClientEvent::SessionReady(data)),
            Envelope::Disconnected { .. } => Some(ClientEvent::SessionDisconnected),
            Envelope::Error { data } => Some(ClientEvent::SessionError(data.error)),
            Envelope::Connected { data } => Some(ClientEvent::ProxyStatus {
                connected: data.connected,
            }),
            Envelope::Login { .. } | Envelope::Command { .. } | Envelope::Response { .. } => None,
        }
    }
}
