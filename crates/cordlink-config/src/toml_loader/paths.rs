use cordlink_common::ConfigError;

/// Platform config location, e.g. `~/.config/cordlink/client.toml` on Linux.
pub fn default_config_path() -> Result<std::path::PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("cordlink").join("client.toml"))
}
