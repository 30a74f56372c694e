//! Maps relay method names onto native RPC commands.

use cordlink_common::RelayError;
use serde_json::{json, Map, Value};

/// Every method a peer may invoke.
pub const METHODS: &[&str] = &[
    "getChannels",
    "getGuilds",
    "getSelectedVoiceChannel",
    "getVoiceSettings",
    "setVoiceSettings",
    "setUserVoiceSettings",
    "selectVoiceChannel",
    "selectTextChannel",
    "subscribe",
    "unsubscribe",
    "setActivity",
    "clearActivity",
];

#[derive(Debug, Clone, PartialEq)]
pub struct NativeRequest {
    pub cmd: &'static str,
    pub args: Value,
    pub evt: Option<String>,
    /// Field of the reply returned to the peer instead of the whole reply.
    pub pluck: Option<&'static str>,
}

impl NativeRequest {
    fn new(cmd: &'static str, args: Value) -> Self {
        Self {
            cmd,
            args,
            evt: None,
            pluck: None,
        }
    }

    fn pluck(mut self, field: &'static str) -> Self {
        self.pluck = Some(field);
        self
    }

    /// Shape the native reply into the command's result.
    pub fn result(&self, reply: Value) -> Value {
        match self.pluck {
            Some(field) => reply.get(field).cloned().unwrap_or(Value::Null),
            None => reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Answered without a round-trip to the application.
    Local(Value),
    Native(NativeRequest),
}

/// Resolve `method` and its `params` to what the session should do.
pub fn route(method: &str, params: &Value) -> Result<Route, RelayError> {
    let request = match method {
        "getChannels" => NativeRequest::new(
            "GET_CHANNELS",
            json!({ "guild_id": required(method, params, "guildId")? }),
        )
        .pluck("channels"),
        "getGuilds" => NativeRequest::new("GET_GUILDS", json!({})).pluck("guilds"),
        "getSelectedVoiceChannel" => NativeRequest::new("GET_SELECTED_VOICE_CHANNEL", json!({})),
        "getVoiceSettings" => NativeRequest::new("GET_VOICE_SETTINGS", json!({})),
        "setVoiceSettings" => NativeRequest::new(
            "SET_VOICE_SETTINGS",
            Value::Object(object(params, "settings")),
        ),
        "setUserVoiceSettings" => {
            let mut args = object(params, "settings");
            args.insert("user_id".into(), required(method, params, "userId")?);
            NativeRequest::new("SET_USER_VOICE_SETTINGS", Value::Object(args))
        }
        "selectVoiceChannel" => {
            // A null channel leaves voice.
            let mut args = object(params, "options");
            args.insert("channel_id".into(), optional(params, "channelId"));
            NativeRequest::new("SELECT_VOICE_CHANNEL", Value::Object(args))
        }
        "selectTextChannel" => NativeRequest::new(
            "SELECT_TEXT_CHANNEL",
            json!({ "channel_id": optional(params, "channelId") }),
        ),
        "subscribe" => {
            let event = required(method, params, "event")?;
            let Some(event) = event.as_str().map(str::to_owned) else {
                return Err(RelayError::Upstream(format!(
                    "{method}: event must be a string"
                )));
            };
            NativeRequest {
                evt: Some(event),
                ..NativeRequest::new("SUBSCRIBE", Value::Object(object(params, "args")))
            }
        }
        "unsubscribe" => return Ok(Route::Local(json!({ "success": true }))),
        "setActivity" => NativeRequest::new(
            "SET_ACTIVITY",
            json!({ "pid": std::process::id(), "activity": optional(params, "activity") }),
        ),
        "clearActivity" => NativeRequest::new("SET_ACTIVITY", json!({ "pid": std::process::id() })),
        other => return Err(RelayError::UnknownMethod(other.to_string())),
    };
    Ok(Route::Native(request))
}

fn optional(params: &Value, key: &str) -> Value {
    params.get(key).cloned().unwrap_or(Value::Null)
}

fn required(method: &str, params: &Value, key: &str) -> Result<Value, RelayError> {
    match params.get(key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(RelayError::Upstream(format!(
            "{method}: missing parameter {key}"
        ))),
    }
}

fn object(params: &Value, key: &str) -> Map<String, Value> {
    params
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
