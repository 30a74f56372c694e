//! IPC client: a writer task, a reader task, and a nonce-keyed map of
//! in-flight requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{Frame, IpcCodec, Opcode};
use crate::oauth::{self, TokenSet};
use crate::transport::{self, BoxedStream};
use crate::IpcError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// AUTHORIZE waits on the user clicking through a consent dialog.
const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(300);
const EVENT_CAPACITY: usize = 256;

type FramedStream = Framed<BoxedStream, IpcCodec>;
type Waiter = oneshot::Sender<Result<Value, IpcError>>;
type PendingMap = Arc<Mutex<HashMap<String, Waiter>>>;

/// Everything needed to log in against the local application.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// The same credentials with both tokens removed, forcing a fresh
    /// authorization.
    pub fn without_tokens(&self) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IpcEvent {
    /// Login completed.
    Ready {
        access_token: String,
        refresh_token: Option<String>,
        user: Option<Value>,
    },
    /// The socket closed or the application sent CLOSE.
    Disconnected,
    /// An ERROR event that did not answer any request.
    Error(String),
    Dispatch { evt: String, data: Value },
}

#[derive(Debug, Deserialize)]
struct RpcMessage {
    cmd: String,
    #[serde(default)]
    evt: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct CloseBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

struct Link {
    outbound: mpsc::Sender<Frame>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct IpcClient {
    events: broadcast::Sender<IpcEvent>,
    link: tokio::sync::Mutex<Option<Link>>,
    /// Held across connect and authenticate so concurrent logins share
    /// one socket and one authorization.
    login_lock: tokio::sync::Mutex<()>,
    pending: PendingMap,
    authenticated: Arc<AtomicBool>,
    http: reqwest::Client,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            link: tokio::sync::Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            authenticated: Arc::new(AtomicBool::new(false)),
            http: reqwest::Client::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IpcEvent> {
        self.events.subscribe()
    }

    /// True once a login has completed and the socket is still open.
    pub fn is_connected(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Discover the application's socket and complete the handshake.
    pub async fn connect(&self, client_id: &str) -> Result<(), IpcError> {
        let stream = transport::connect().await?;
        self.attach(stream, client_id).await
    }

    /// Complete the handshake over an already-open stream and start the
    /// reader and writer tasks.
    pub async fn attach(&self, stream: BoxedStream, client_id: &str) -> Result<(), IpcError> {
        let mut framed = Framed::new(stream, IpcCodec);
        framed
            .send(Frame::json(
                Opcode::Handshake,
                &json!({ "v": 1, "client_id": client_id }),
            )?)
            .await?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, await_ready(&mut framed))
            .await
            .map_err(|_| IpcError::Timeout("handshake".into()))??;
        info!("IPC handshake complete");

        let (sink, stream) = framed.split();
        let (outbound, outbound_rx) = mpsc::channel(64);
        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            stream,
            outbound.clone(),
            Arc::clone(&self.pending),
            self.events.clone(),
            Arc::clone(&self.authenticated),
        ));

        let previous = self.link.lock().await.replace(Link {
            outbound,
            reader,
            writer,
        });
        if let Some(old) = previous {
            old.reader.abort();
            old.writer.abort();
            // Replies to the old socket can no longer arrive.
            self.authenticated.store(false, Ordering::SeqCst);
            fail_all(&self.pending);
        }
        Ok(())
    }

    /// Log in, connecting first if needed.
    ///
    /// An access token is used as-is; a lone refresh token is exchanged for
    /// a new access token; with neither, the user is asked to authorize.
    ///
    /// Logins are serialized. One that finds the session already
    /// authenticated on a live socket returns without touching it.
    pub async fn login(&self, creds: &Credentials) -> Result<(), IpcError> {
        let _serial = self.login_lock.lock().await;
        if !self.is_linked().await {
            self.connect(&creds.client_id).await?;
        } else if self.is_connected() {
            debug!("Already authenticated, skipping login");
            return Ok(());
        }

        let tokens = match (&creds.access_token, &creds.refresh_token) {
            (Some(access), refresh) => TokenSet {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
                expires_in: None,
                scope: None,
            },
            (None, Some(refresh)) => oauth::refresh(&self.http, creds, refresh).await?,
            (None, None) => {
                let code = self.authorize(creds).await?;
                oauth::exchange_code(&self.http, creds, &code).await?
            }
        };

        let data = self
            .request(
                "AUTHENTICATE",
                json!({ "access_token": tokens.access_token }),
                None,
            )
            .await?;

        self.authenticated.store(true, Ordering::SeqCst);
        info!("Authenticated with local client");
        let _ = self.events.send(IpcEvent::Ready {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: data.get("user").cloned(),
        });
        Ok(())
    }

    async fn authorize(&self, creds: &Credentials) -> Result<String, IpcError> {
        let data = self
            .request_with_timeout(
                "AUTHORIZE",
                json!({ "client_id": creds.client_id, "scopes": creds.scopes }),
                None,
                AUTHORIZE_TIMEOUT,
            )
            .await?;
        data.get("code")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| IpcError::UnexpectedReply("AUTHORIZE reply has no code".into()))
    }

    /// Send one RPC command and wait for the reply carrying its nonce.
    pub async fn request(
        &self,
        cmd: &str,
        args: Value,
        evt: Option<&str>,
    ) -> Result<Value, IpcError> {
        self.request_with_timeout(cmd, args, evt, REQUEST_TIMEOUT)
            .await
    }

    async fn request_with_timeout(
        &self,
        cmd: &str,
        args: Value,
        evt: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, IpcError> {
        let outbound = self.outbound().await.ok_or(IpcError::Closed)?;

        let nonce = uuid::Uuid::new_v4().to_string();
        let mut body = json!({ "cmd": cmd, "args": args, "nonce": nonce });
        if let Some(evt) = evt {
            body["evt"] = Value::from(evt);
        }
        let frame = Frame::json(Opcode::Frame, &body)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(nonce.clone(), tx);
        debug!(cmd = %cmd, nonce = %nonce, "IPC request");

        if outbound.send(frame).await.is_err() {
            lock(&self.pending).remove(&nonce);
            return Err(IpcError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(IpcError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&nonce);
                Err(IpcError::Timeout(cmd.to_string()))
            }
        }
    }

    /// Close the socket and fail anything still in flight.
    pub async fn destroy(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.reader.abort();
            link.writer.abort();
        }
        self.authenticated.store(false, Ordering::SeqCst);
        fail_all(&self.pending);
    }

    async fn is_linked(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| !link.reader.is_finished())
    }

    async fn outbound(&self) -> Option<mpsc::Sender<Frame>> {
        self.link
            .lock()
            .await
            .as_ref()
            .filter(|link| !link.reader.is_finished())
            .map(|link| link.outbound.clone())
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, Waiter>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fail_all(pending: &PendingMap) {
    for (_, waiter) in lock(pending).drain() {
        let _ = waiter.send(Err(IpcError::Closed));
    }
}

fn rpc_error(data: &Value) -> IpcError {
    IpcError::Rpc {
        code: data.get("code").and_then(Value::as_i64).unwrap_or(0),
        message: data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    }
}

async fn await_ready(framed: &mut FramedStream) -> Result<(), IpcError> {
    while let Some(frame) = framed.next().await {
        let frame = frame?;
        match frame.opcode {
            Opcode::Frame => {
                let msg: RpcMessage = frame.decode_body()?;
                if msg.cmd == "DISPATCH" && msg.evt.as_deref() == Some("READY") {
                    return Ok(());
                }
            }
            Opcode::Close => {
                let body: CloseBody = frame.decode_body().unwrap_or_default();
                return Err(IpcError::Handshake(format!("{}: {}", body.code, body.message)));
            }
            _ => {}
        }
    }
    Err(IpcError::Closed)
}

async fn write_loop(mut sink: SplitSink<FramedStream, Frame>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, "IPC write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<FramedStream>,
    outbound: mpsc::Sender<Frame>,
    pending: PendingMap,
    events: broadcast::Sender<IpcEvent>,
    authenticated: Arc<AtomicBool>,
) {
    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "IPC read failed");
                break;
            }
        };

        match frame.opcode {
            Opcode::Frame => match frame.decode_body::<RpcMessage>() {
                Ok(msg) => route(msg, &pending, &events),
                Err(e) => warn!(error = %e, "Malformed IPC frame"),
            },
            Opcode::Ping => {
                let pong = Frame {
                    opcode: Opcode::Pong,
                    payload: frame.payload,
                };
                let _ = outbound.send(pong).await;
            }
            Opcode::Close => {
                let body: CloseBody = frame.decode_body().unwrap_or_default();
                info!(code = body.code, message = %body.message, "IPC closed by application");
                break;
            }
            Opcode::Pong | Opcode::Handshake => {}
        }
    }

    authenticated.store(false, Ordering::SeqCst);
    fail_all(&pending);
    let _ = events.send(IpcEvent::Disconnected);
}

fn route(msg: RpcMessage, pending: &PendingMap, events: &broadcast::Sender<IpcEvent>) {
    let is_error = msg.evt.as_deref() == Some("ERROR");

    if let Some(nonce) = msg.nonce.as_deref() {
        let waiter = lock(pending).remove(nonce);
        if let Some(waiter) = waiter {
            let result = if is_error {
                Err(rpc_error(&msg.data))
            } else {
                Ok(msg.data)
            };
            let _ = waiter.send(result);
            return;
        }
    }

    if is_error {
        let _ = events.send(IpcEvent::Error(rpc_error(&msg.data).to_string()));
    } else if msg.cmd == "DISPATCH" {
        if let Some(evt) = msg.evt {
            let _ = events.send(IpcEvent::Dispatch {
                evt,
                data: msg.data,
            });
        }
    } else {
        debug!(cmd = %msg.cmd, "Unmatched IPC reply");
    }
}
