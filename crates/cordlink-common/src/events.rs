use serde_json::Value;
use tokio::sync::broadcast;

use crate::protocol::{Envelope, ReadyPayload};

/// Upstream dispatch events the local session forwards to peers.
pub const FORWARDED_EVENTS: &[&str] = &[
    "CHANNEL_CREATE",
    "GUILD_CREATE",
    "VOICE_CHANNEL_SELECT",
    "VOICE_CONNECTION_STATUS",
    "VOICE_SETTINGS_UPDATE",
    "VOICE_STATE_CREATE",
    "VOICE_STATE_DELETE",
    "VOICE_STATE_UPDATE",
    "SPEAKING_START",
    "SPEAKING_STOP",
];

/// Events emitted by the local session adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Ready(ReadyPayload),
    Disconnected,
    Error(String),
    Domain { name: String, data: Value },
}

impl SessionEvent {
    /// The envelope broadcast to every peer for this event.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            SessionEvent::Ready(payload) => Envelope::Ready {
                data: payload.clone(),
            },
            SessionEvent::Disconnected => Envelope::disconnected(),
            SessionEvent::Error(message) => Envelope::error(message.clone()),
            SessionEvent::Domain { name, data } => Envelope::event(name.clone(), data.clone()),
        }
    }
}

/// Typed fan-out: every subscriber sees every event published after it
/// subscribed, in publish order.
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_and_receive_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::Disconnected);
        bus.publish(SessionEvent::Error("boom".into()));

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Disconnected);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Error("boom".into()));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        let _early = bus.subscribe();
        bus.publish(SessionEvent::Disconnected);

        let mut late = bus.subscribe();
        bus.publish(SessionEvent::Error("after".into()));

        assert_eq!(late.recv().await.unwrap(), SessionEvent::Error("after".into()));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus: EventBus<SessionEvent> = EventBus::new(4);
        assert_eq!(bus.publish(SessionEvent::Disconnected), 0);
    }

    #[test]
    fn domain_event_maps_to_event_envelope() {
        let ev = SessionEvent::Domain {
            name: "SPEAKING_START".into(),
            data: json!({"user_id": "1"}),
        };
        assert_eq!(
            ev.to_envelope(),
            Envelope::event("SPEAKING_START", json!({"user_id": "1"}))
        );
    }

    #[test]
    fn state_events_map_to_state_envelopes() {
        assert_eq!(SessionEvent::Disconnected.to_envelope(), Envelope::disconnected());
        assert_eq!(
            SessionEvent::Error("x".into()).to_envelope(),
            Envelope::error("x")
        );
        assert!(matches!(
            SessionEvent::Ready(ReadyPayload::default()).to_envelope(),
            Envelope::Ready { .. }
        ));
    }

    #[test]
    fn forwarded_list_has_speaking_events() {
        assert!(FORWARDED_EVENTS.contains(&"SPEAKING_START"));
        assert!(FORWARDED_EVENTS.contains(&"SPEAKING_STOP"));
        assert_eq!(FORWARDED_EVENTS.len(), 10);
    }
}
