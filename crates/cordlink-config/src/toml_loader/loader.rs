use std::path::Path;

use cordlink_common::ConfigError;
use tracing::{debug, info};

use super::paths::default_config_path;
use crate::schema::ClientConfig;
use crate::validation;

/// Load and validate a client config from a TOML file.
///
/// Missing keys take their defaults; the result must still pass
/// [`validation::validate_client`].
pub fn load_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: ClientConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    validation::validate_client(&config)?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load from the platform default path.
///
/// A missing file yields the defaults, which do not validate until a
/// client id and secret are supplied some other way; callers are expected
/// to override those before use.
pub fn load_default() -> Result<ClientConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            debug!("no config at {}, using defaults", path.display());
            Ok(ClientConfig::default())
        }
        Err(e) => Err(e),
    }
}
