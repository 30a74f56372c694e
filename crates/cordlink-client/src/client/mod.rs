//! The relay client connection.

mod link;
mod pending;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cordlink_common::{Envelope, EventBus, RelayError, RequestIds};
use cordlink_config::ClientConfig;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::events::{ClientEvent, ConnectionState};
pub use pending::{PendingMap, PendingRequest};

const EVENT_CAPACITY: usize = 256;

/// How long teardown waits for the link to close cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// One logical connection to a proxy, surviving link drops.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    ids: RequestIds,
    pending: PendingMap,
    events: EventBus<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    /// Present while the link is open.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    link: Mutex<Option<JoinHandle<()>>>,
    /// At most one scheduled reconnect.
    reconnect: Mutex<Option<JoinHandle<()>>>,
    /// Set by teardown; suppresses reconnects until the next `connect`.
    closed: AtomicBool,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                ids: RequestIds::new(),
                pending: PendingMap::default(),
                events: EventBus::new(EVENT_CAPACITY),
                state,
                outbound: Mutex::new(None),
                link: Mutex::new(None),
                reconnect: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Number of commands still awaiting a response.
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    /// Open the link. No-op while already connecting, connected, or waiting
    /// on a scheduled reconnect. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        self.inner.closed.store(false, Ordering::SeqCst);
        if self.inner.reconnect_scheduled() {
            debug!("Reconnect already scheduled");
            return;
        }
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            ConnectionState::Idle | ConnectionState::Reconnecting => self.inner.start_link(),
        }
    }

    /// Send a command and wait for its response.
    ///
    /// Fails with the proxy's error message, or with a timeout once the
    /// configured deadline passes. A dropped link does not fail the call
    /// early; only the deadline does.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        let id = self.inner.ids.next_id();
        let timeout = self.inner.config.request_timeout();
        let deadline = Instant::now() + timeout;
        let rx = self.inner.pending.insert(id.clone(), method, deadline);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: &id,
        };

        self.inner.send(&Envelope::command(id.as_str(), method, params));

        let timed_out = || RelayError::Timeout {
            id: id.clone(),
            after_ms: timeout.as_millis() as u64,
        };
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Cleared by teardown: the caller still sees its own deadline.
            Ok(Err(_)) => {
                tokio::time::sleep_until(deadline).await;
                Err(timed_out())
            }
            Err(_) => {
                debug!(id = %id, method, "Request timed out");
                Err(timed_out())
            }
        }
    }

    /// Tear the connection down: cancel any reconnect, close the link, and
    /// forget pending commands without completing them.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        if let Some(timer) = lock(&inner.reconnect).take() {
            timer.abort();
        }

        // Dropping the sender makes the link send a close frame and exit.
        lock(&inner.outbound).take();
        let link = lock(&inner.link).take();
        if let Some(mut link) = link {
            if tokio::time::timeout(CLOSE_GRACE, &mut link).await.is_err() {
                link.abort();
            }
        }

        let dropped = inner.pending.clear();
        if dropped > 0 {
            debug!(dropped, "Discarded pending requests");
        }
        inner.state.send_replace(ConnectionState::Idle);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.reconnect).take() {
            timer.abort();
        }
        if let Some(link) = lock(&self.link).take() {
            link.abort();
        }
    }
}

impl Inner {
    fn reconnect_scheduled(&self) -> bool {
        lock(&self.reconnect)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    fn start_link(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(ConnectionState::Connecting);
        let handle = tokio::spawn(link::run(Arc::downgrade(self)));
        *lock(&self.link) = Some(handle);
    }

    /// Arrange exactly one reconnect after the configured delay. Returns
    /// false if one is already pending or the client was torn down.
    fn schedule_reconnect(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut slot = lock(&self.reconnect);
        if slot.as_ref().is_some_and(|timer| !timer.is_finished()) {
            return false;
        }

        let delay = self.config.reconnect_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        self.state.send_replace(ConnectionState::Reconnecting);
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                lock(&inner.reconnect).take();
                inner.start_link();
            }
        }));
        true
    }

    /// Queue a frame on the open link. Without one, the frame is dropped.
    fn send(&self, envelope: &Envelope) -> bool {
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(kind = envelope.kind(), error = %e, "Failed to encode envelope");
                return false;
            }
        };
        let sent = lock(&self.outbound)
            .as_ref()
            .is_some_and(|tx| tx.send(json).is_ok());
        if !sent {
            warn!(kind = envelope.kind(), "Not connected to proxy, dropping message");
        }
        sent
    }

    /// Route one inbound frame from the proxy.
    fn dispatch(&self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame from proxy");
                return;
            }
        };

        if let Envelope::Response { id, result, error } = envelope {
            let outcome = match error {
                Some(message) => Err(RelayError::Upstream(message)),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            if !self.pending.complete(&id, outcome) {
                debug!(id = %id, "Ignoring response with no pending request");
            }
            return;
        }

        let kind = envelope.kind();
        match ClientEvent::from_envelope(envelope) {
            Some(event) => {
                self.events.publish(event);
            }
            None => warn!(kind, "Ignoring unexpected envelope from proxy"),
        }
    }
}

/// Removes the pending entry if the call finishes without a response,
/// including when the caller drops the future.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
