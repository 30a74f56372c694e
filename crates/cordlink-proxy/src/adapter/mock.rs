//! In-memory stand-in for the local application.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cordlink_ipc::{Credentials, IpcError, IpcEvent};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::NativeClient;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub cmd: String,
    pub args: Value,
    pub evt: Option<String>,
}

pub struct MockNative {
    events: broadcast::Sender<IpcEvent>,
    pub logins: Mutex<Vec<Credentials>>,
    login_results: Mutex<VecDeque<Result<(), IpcError>>>,
    pub calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, Result<Value, String>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MockNative {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            logins: Mutex::new(Vec::new()),
            login_results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// Queue the outcome of the next login; unqueued logins succeed.
    pub fn fail_next_login(&self, err: IpcError) {
        self.login_results.lock().unwrap().push_back(Err(err));
    }

    pub fn reply(&self, cmd: &str, reply: Value) {
        self.replies.lock().unwrap().insert(cmd.into(), Ok(reply));
    }

    pub fn reject(&self, cmd: &str, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(cmd.into(), Err(message.into()));
    }

    pub fn delay(&self, cmd: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(cmd.into(), delay);
    }

    pub fn emit(&self, event: IpcEvent) {
        let _ = self.events.send(event);
    }

    pub fn ready(&self) {
        self.emit(IpcEvent::Ready {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            user: Some(json!({"id": "1", "username": "tester"})),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NativeClient for MockNative {
    async fn login(&self, creds: &Credentials) -> Result<(), IpcError> {
        self.logins.lock().unwrap().push(creds.clone());
        let outcome = self.login_results.lock().unwrap().pop_front();
        match outcome {
            Some(Err(e)) => Err(e),
            _ => {
                self.emit(IpcEvent::Ready {
                    access_token: creds
                        .access_token
                        .clone()
                        .unwrap_or_else(|| "fresh".into()),
                    refresh_token: creds.refresh_token.clone(),
                    user: Some(json!({"id": "1", "username": "tester"})),
                });
                Ok(())
            }
        }
    }

    async fn request(
        &self,
        cmd: &str,
        args: Value,
        evt: Option<&str>,
    ) -> Result<Value, IpcError> {
        self.calls.lock().unwrap().push(Call {
            cmd: cmd.into(),
            args,
            evt: evt.map(str::to_owned),
        });
        let delay = self.delays.lock().unwrap().get(cmd).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().get(cmd).cloned();
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(IpcError::Rpc {
                code: 4000,
                message,
            }),
            None => Ok(Value::Null),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<IpcEvent> {
        self.events.subscribe()
    }

    async fn destroy(&self) {
        self.emit(IpcEvent::Disconnected);
    }
}
