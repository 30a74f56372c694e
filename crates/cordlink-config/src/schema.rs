use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;

/// OAuth2 scopes requested when the proxy authorizes against the local client.
pub const DEFAULT_SCOPES: &[&str] = &[
    "identify",
    "rpc",
    "rpc.voice.read",
    "rpc.voice.write",
    "guilds",
];

/// Settings for the relay client running inside the control surface.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host running the proxy.
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Delay before reconnecting after the link to the proxy drops.
    pub reconnect_delay_ms: u64,
    /// How long a command waits for its response.
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            client_id: String::new(),
            client_secret: String::new(),
            access_token: None,
            refresh_token: None,
            reconnect_delay_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Settings for the proxy process that owns the local IPC session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen port, bound on all interfaces.
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost".into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ProxyConfig {
    pub fn new(port: u16, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            port,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8080");
    }

    #[test]
    fn client_debug_redacts_secrets() {
        let config = ClientConfig {
            client_secret: "hunter2".into(),
            access_token: Some("tok".into()),
            ..ClientConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("tok\""));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn proxy_defaults() {
        let config = ProxyConfig::new(9000, "id", "secret");
        assert_eq!(config.listen_addr(), "0.0.0.0:9000");
        assert_eq!(config.redirect_uri, "http://localhost");
        assert_eq!(config.scopes.len(), 5);
        assert!(!format!("{config:?}").contains("secret\""));
    }
}
