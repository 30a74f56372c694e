//! Relay wire protocol: one JSON `Envelope` per WebSocket text frame.
//!
//! The `type` field selects the variant. Anything that does not parse into
//! a known variant is a protocol error on the receiving side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RelayError;

/// Tokens a peer passes through to the proxy's login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Payload of a `ready` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyState {
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Client → server.
    Login {
        #[serde(default)]
        params: LoginParams,
    },

    /// Client → server. `id` is unique for the lifetime of the connection.
    Command {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },

    /// Server → originating client only.
    Response {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Server → all clients, a forwarded upstream event.
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },

    Ready {
        #[serde(default)]
        data: ReadyPayload,
    },

    Disconnected {
        #[serde(default)]
        data: Map<String, Value>,
    },

    Error { data: ErrorData },

    /// Sent by the server to each peer right after it attaches.
    Connected { data: ProxyState },
}

impl Envelope {
    pub fn command(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Envelope::Command {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a `response` from the outcome of a command. A successful
    /// outcome always serializes a `result` key, even when it is `null`.
    pub fn response(id: impl Into<String>, outcome: Result<Value, RelayError>) -> Self {
        let id = id.into();
        match outcome {
            Ok(result) => Envelope::Response {
                id,
                result: Some(result),
                error: None,
            },
            Err(e) => Envelope::Response {
                id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Envelope::Event {
            event: name.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            data: ErrorData {
                error: message.into(),
            },
        }
    }

    pub fn disconnected() -> Self {
        Envelope::Disconnected { data: Map::new() }
    }

    pub fn connected(connected: bool) -> Self {
        Envelope::Connected {
            data: ProxyState { connected },
        }
    }

    /// Wire tag of this envelope, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Login { .. } => "login",
            Envelope::Command { .. } => "command",
            Envelope::Response { .. } => "response",
            Envelope::Event { .. } => "event",
            Envelope::Ready { .. } => "ready",
            Envelope::Disconnected { .. } => "disconnected",
            Envelope::Error { .. } => "error",
            Envelope::Connected { .. } => "connected",
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_wire_shape() {
        let env = Envelope::command("req_1", "getGuilds", json!({}));
        let value: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({"type": "command", "id": "req_1", "method": "getGuilds", "params": {}})
        );
    }

    #[test]
    fn successful_response_keeps_null_result() {
        let env = Envelope::response("req_2", Ok(Value::Null));
        let text = env.to_json().unwrap();
        assert_eq!(text, r#"{"type":"response","id":"req_2","result":null}"#);
    }

    #[test]
    fn failed_response_carries_only_error() {
        let env = Envelope::response(
            "req_3",
            Err(RelayError::UnknownMethod("doesNotExist".into())),
        );
        let value: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({"type": "response", "id": "req_3", "error": "Unknown command: doesNotExist"})
        );
    }

    #[test]
    fn login_omits_absent_tokens() {
        let env = Envelope::Login {
            params: LoginParams {
                access_token: Some("abc".into()),
                refresh_token: None,
            },
        };
        assert_eq!(
            env.to_json().unwrap(),
            r#"{"type":"login","params":{"accessToken":"abc"}}"#
        );
    }

    #[test]
    fn login_without_params_parses() {
        let env = Envelope::from_json(r#"{"type":"login"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Login {
                params: LoginParams::default()
            }
        );
    }

    #[test]
    fn server_state_envelopes_shape() {
        assert_eq!(
            serde_json::to_value(Envelope::disconnected()).unwrap(),
            json!({"type": "disconnected", "data": {}})
        );
        assert_eq!(
            serde_json::to_value(Envelope::connected(true)).unwrap(),
            json!({"type": "connected", "data": {"connected": true}})
        );
        assert_eq!(
            serde_json::to_value(Envelope::error("boom")).unwrap(),
            json!({"type": "error", "data": {"error": "boom"}})
        );
    }

    #[test]
    fn ready_payload_is_camel_case() {
        let env = Envelope::from_json(
            r#"{"type":"ready","data":{"accessToken":"a","refreshToken":"r","user":{"id":"42"}}}"#,
        )
        .unwrap();
        match env {
            Envelope::Ready { data } => {
                assert_eq!(data.access_token.as_deref(), Some("a"));
                assert_eq!(data.refresh_token.as_deref(), Some("r"));
                assert_eq!(data.user, Some(json!({"id": "42"})));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn event_with_missing_data_defaults_to_null() {
        let env = Envelope::from_json(r#"{"type":"event","event":"SPEAKING_START"}"#).unwrap();
        assert_eq!(env, Envelope::event("SPEAKING_START", Value::Null));
    }

    #[test]
    fn unknown_type_is_protocol_error() {
        let err = Envelope::from_json(r#"{"type":"hello"}"#).unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn non_json_is_protocol_error() {
        let err = Envelope::from_json("not json").unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn command_without_id_is_rejected() {
        let err = Envelope::from_json(r#"{"type":"command","method":"getGuilds"}"#).unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn kind_matches_tag() {
        assert_eq!(Envelope::connected(false).kind(), "connected");
        assert_eq!(Envelope::event("X", Value::Null).kind(), "event");
        assert_eq!(Envelope::response("1", Ok(Value::Null)).kind(), "response");
    }
}
