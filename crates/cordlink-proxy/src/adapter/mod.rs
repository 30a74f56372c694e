//! The local session adapter: one authenticated IPC session, a fixed method
//! table over it, and a filtered stream of its events.

mod dispatch;
mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cordlink_common::{
    EventBus, LoginParams, ReadyPayload, RelayError, SessionEvent, FORWARDED_EVENTS,
};
use cordlink_config::ProxyConfig;
use cordlink_ipc::{Credentials, IpcError, IpcEvent, INVALID_TOKEN_CODE};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use dispatch::{route, NativeRequest, Route, METHODS};
pub use native::NativeClient;

const EVENT_CAPACITY: usize = 256;

pub struct LocalSession {
    native: Arc<dyn NativeClient>,
    config: ProxyConfig,
    connected: Arc<AtomicBool>,
    events: Arc<EventBus<SessionEvent>>,
    pump: JoinHandle<()>,
}

impl LocalSession {
    /// Wrap `native` and start republishing its events. Must be called from
    /// within a tokio runtime.
    pub fn start(native: Arc<dyn NativeClient>, config: ProxyConfig) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let events = Arc::new(EventBus::new(EVENT_CAPACITY));
        let pump = tokio::spawn(pump(
            native.subscribe(),
            Arc::clone(&connected),
            Arc::clone(&events),
        ));
        Self {
            native,
            config,
            connected,
            events,
            pump,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// True once the application has confirmed the login.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Authenticate against the local application.
    ///
    /// Tokens in `params` take precedence. A token the application rejects
    /// as invalid is discarded and login retried once without tokens, which
    /// falls back to interactive authorization. Success is announced as a
    /// `Ready` event; failure as an `Error` event.
    pub async fn login(&self, params: LoginParams) -> Result<(), RelayError> {
        let creds = Credentials {
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            scopes: self.config.scopes.clone(),
            access_token: params.access_token.filter(|t| !t.is_empty()),
            refresh_token: params.refresh_token.filter(|t| !t.is_empty()),
        };

        info!(
            with_token = creds.access_token.is_some() || creds.refresh_token.is_some(),
            "Logging in to local client"
        );
        match self.native.login(&creds).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(INVALID_TOKEN_CODE) => {
                warn!("Stored token rejected, re-authorizing");
                self.native
                    .login(&creds.without_tokens())
                    .await
                    .map_err(|e| self.login_failed(e))
            }
            Err(e) => Err(self.login_failed(e)),
        }
    }

    fn login_failed(&self, e: IpcError) -> RelayError {
        let err = RelayError::Auth(e.to_string());
        warn!(error = %err, "Login failed");
        self.events.publish(SessionEvent::Error(err.to_string()));
        err
    }

    /// Run one relay method against the application.
    pub async fn execute(&self, method: &str, params: &Value) -> Result<Value, RelayError> {
        let route = route(method, params)?;
        if !self.is_connected() {
            return Err(RelayError::Upstream("Discord client not connected".into()));
        }

        let request = match route {
            Route::Local(result) => return Ok(result),
            Route::Native(request) => request,
        };

        debug!(method, cmd = request.cmd, "Executing command");
        let reply = self
            .native
            .request(request.cmd, request.args.clone(), request.evt.as_deref())
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))?;
        Ok(request.result(reply))
    }

    pub async fn destroy(&self) {
        self.native.destroy().await;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Track connection state from native events and republish the ones peers
/// care about. State is updated before the event goes out so a peer that
/// sees `ready` can issue commands immediately.
async fn pump(
    mut rx: broadcast::Receiver<IpcEvent>,
    connected: Arc<AtomicBool>,
    events: Arc<EventBus<SessionEvent>>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Session event pump lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let out = match event {
            IpcEvent::Ready {
                access_token,
                refresh_token,
                user,
            } => {
                connected.store(true, Ordering::SeqCst);
                SessionEvent::Ready(ReadyPayload {
                    access_token: Some(access_token),
                    refresh_token,
                    user,
                })
            }
            IpcEvent::Disconnected => {
                connected.store(false, Ordering::SeqCst);
                SessionEvent::Disconnected
            }
            IpcEvent::Error(message) => SessionEvent::Error(message),
            IpcEvent::Dispatch { evt, data } => {
                if !FORWARDED_EVENTS.contains(&evt.as_str()) {
                    debug!(evt = %evt, "Dropping unforwarded event");
                    continue;
                }
                SessionEvent::Domain { name: evt, data }
            }
        };
        events.publish(out);
    }
    debug!("Session event pump stopped");
}
