use async_trait::async_trait;
use cordlink_ipc::{Credentials, IpcClient, IpcError, IpcEvent};
use serde_json::Value;
use tokio::sync::broadcast;

/// The local application's RPC surface as the session adapter uses it.
#[async_trait]
pub trait NativeClient: Send + Sync {
    async fn login(&self, creds: &Credentials) -> Result<(), IpcError>;

    async fn request(&self, cmd: &str, args: Value, evt: Option<&str>)
        -> Result<Value, IpcError>;

    fn subscribe(&self) -> broadcast::Receiver<IpcEvent>;

    async fn destroy(&self);
}

#[async_trait]
impl NativeClient for IpcClient {
    async fn login(&self, creds: &Credentials) -> Result<(), IpcError> {
        IpcClient::login(self, creds).await
    }

    async fn request(
        &self,
        cmd: &str,
        args: Value,
        evt: Option<&str>,
    ) -> Result<Value, IpcError> {
        IpcClient::request(self, cmd, args, evt).await
    }

    fn subscribe(&self) -> broadcast::Receiver<IpcEvent> {
        IpcClient::subscribe(self)
    }

    async fn destroy(&self) {
        IpcClient::destroy(self).await
    }
}
