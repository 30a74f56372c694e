pub mod errors;
pub mod events;
pub mod id;
pub mod protocol;

pub use errors::{ConfigError, RelayError};
pub use events::{EventBus, SessionEvent, FORWARDED_EVENTS};
pub use id::RequestIds;
pub use protocol::{Envelope, ErrorData, LoginParams, ProxyState, ReadyPayload};
