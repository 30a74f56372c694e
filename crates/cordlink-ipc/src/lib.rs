//! Client for the chat/voice application's local RPC socket.
//!
//! Speaks the length-prefixed JSON frame protocol over a Unix socket or
//! Windows named pipe, performs the OAuth2 login dance, correlates
//! requests by nonce, and republishes dispatch events.

pub mod client;
pub mod codec;
pub mod oauth;
pub mod transport;

pub use client::{Credentials, IpcClient, IpcEvent};
pub use codec::{Frame, IpcCodec, Opcode, MAX_FRAME_LEN};

/// RPC error code for an access token the application no longer accepts.
pub const INVALID_TOKEN_CODE: i64 = 4009;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ipc codec error: {0}")]
    Codec(String),

    #[error("ipc connection closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IpcError {
    /// RPC error code, if the application rejected the request.
    pub fn code(&self) -> Option<i64> {
        match self {
            IpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
