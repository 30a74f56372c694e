//! One typed method per relay command.

use cordlink_common::RelayError;
use serde_json::{json, Value};

use crate::client::RelayClient;

/// Remote control over the proxy's session with the local client.
#[derive(Clone)]
pub struct RemoteSession {
    client: RelayClient,
}

impl RemoteSession {
    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    /// Connect to the proxy. The proxy logs in with the configured tokens
    /// and reports the outcome as a session event.
    pub fn login(&self) {
        self.client.connect();
    }

    pub async fn destroy(&self) {
        self.client.disconnect().await;
    }

    pub async fn get_channels(&self, guild_id: &str) -> Result<Value, RelayError> {
        self.client
            .call("getChannels", json!({ "guildId": guild_id }))
            .await
    }

    pub async fn get_guilds(&self) -> Result<Value, RelayError> {
        self.client.call("getGuilds", json!({})).await
    }

    pub async fn get_selected_voice_channel(&self) -> Result<Value, RelayError> {
        self.client.call("getSelectedVoiceChannel", json!({})).await
    }

    pub async fn get_voice_settings(&self) -> Result<Value, RelayError> {
        self.client.call("getVoiceSettings", json!({})).await
    }

    pub async fn set_voice_settings(&self, settings: Value) -> Result<Value, RelayError> {
        self.client
            .call("setVoiceSettings", json!({ "settings": settings }))
            .await
    }

    pub async fn set_user_voice_settings(
        &self,
        user_id: &str,
        settings: Value,
    ) -> Result<Value, RelayError> {
        self.client
            .call(
                "setUserVoiceSettings",
                json!({ "userId": user_id, "settings": settings }),
            )
            .await
    }

    /// `None` leaves the current voice channel.
    pub async fn select_voice_channel(
        &self,
        channel_id: Option<&str>,
        options: Option<Value>,
    ) -> Result<Value, RelayError> {
        let mut params = json!({ "channelId": channel_id });
        if let Some(options) = options {
            params["options"] = options;
        }
        self.client.call("selectVoiceChannel", params).await
    }

    pub async fn select_text_channel(&self, channel_id: Option<&str>) -> Result<Value, RelayError> {
        self.client
            .call("selectTextChannel", json!({ "channelId": channel_id }))
            .await
    }

    pub async fn subscribe(&self, event: &str, args: Value) -> Result<Value, RelayError> {
        self.client
            .call("subscribe", json!({ "event": event, "args": args }))
            .await
    }

    pub async fn unsubscribe(&self) -> Result<Value, RelayError> {
        self.client.call("unsubscribe", json!({})).await
    }

    pub async fn set_activity(&self, activity: Value) -> Result<Value, RelayError> {
        self.client
            .call("setActivity", json!({ "activity": activity }))
            .await
    }

    pub async fn clear_activity(&self) -> Result<Value, RelayError> {
        self.client.call("clearActivity", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cordlink_common::Envelope;
    use cordlink_config::ClientConfig;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    /// Answer every command with its own method and params, after
    /// checking the login.
    async fn echo_proxy() -> ClientConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                if let Envelope::Command { id, method, params } =
                    Envelope::from_json(text.as_str()).unwrap()
                {
                    let reply = Envelope::response(
                        id,
                        Ok(json!({ "method": method, "params": params })),
                    );
                    ws.send(Message::Text(reply.to_json().unwrap().into()))
                        .await
                        .unwrap();
                }
            }
        });
        ClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..ClientConfig::default()
        }
    }

    async fn connected_session() -> RemoteSession {
        let session = RemoteSession::new(RelayClient::new(echo_proxy().await));
        let mut state = session.client().watch_state();
        session.login();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == crate::ConnectionState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
        session
    }

    #[tokio::test]
    async fn typed_methods_build_wire_params() {
        let session = connected_session().await;

        let echoed = session.get_channels("g1").await.unwrap();
        assert_eq!(
            echoed,
            json!({"method": "getChannels", "params": {"guildId": "g1"}})
        );

        let echoed = session
            .set_user_voice_settings("u1", json!({"volume": 80}))
            .await
            .unwrap();
        assert_eq!(
            echoed["params"],
            json!({"userId": "u1", "settings": {"volume": 80}})
        );

        let echoed = session
            .subscribe("VOICE_STATE_UPDATE", json!({"channel_id": "c"}))
            .await
            .unwrap();
        assert_eq!(
            echoed["params"],
            json!({"event": "VOICE_STATE_UPDATE", "args": {"channel_id": "c"}})
        );

        session.destroy().await;
    }

    #[tokio::test]
    async fn leaving_voice_sends_null_channel() {
        let session = connected_session().await;

        let echoed = session.select_voice_channel(None, None).await.unwrap();
        assert_eq!(echoed["params"], json!({"channelId": null}));

        let echoed = session
            .select_voice_channel(Some("c9"), Some(json!({"force": true})))
            .await
            .unwrap();
        assert_eq!(
            echoed["params"],
            json!({"channelId": "c9", "options": {"force": true}})
        );

        session.destroy().await;
    }
}
