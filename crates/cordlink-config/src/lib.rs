//! Cordlink configuration.
//!
//! Client settings load from TOML with serde defaults, so a partial file
//! works. Proxy settings are assembled by the proxy binary from flags and
//! environment and validated here.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ClientConfig, ProxyConfig, DEFAULT_PORT, DEFAULT_SCOPES};
pub use toml_loader::{default_config_path, load_default, load_from_path};
pub use validation::{validate_client, validate_proxy};
