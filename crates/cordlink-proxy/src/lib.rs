//! cordlink-proxy: owns the single local IPC session and exposes it to any
//! number of control surfaces over WebSocket.
//!
//! Every peer shares the one session. Upstream events are broadcast to all
//! peers; a command's response goes only to the peer that sent it.

pub mod adapter;
pub mod server;

pub use adapter::{LocalSession, NativeClient};
pub use server::{PeerSet, ProxyServer};
