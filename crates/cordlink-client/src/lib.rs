//! cordlink-client: the control-surface side of the relay.
//!
//! [`RelayClient`] keeps one WebSocket link to a proxy alive, correlates
//! commands with their responses, and republishes everything the proxy
//! pushes as typed [`ClientEvent`]s. [`RemoteSession`] layers one method
//! per relay command on top.

pub mod client;
pub mod events;
pub mod remote;

pub use client::RelayClient;
pub use events::{ClientEvent, ConnectionState};
pub use remote::RemoteSession;
