//! Loading config files from disk.

use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::schema::{Config, ConfigDefinitions};
use crate::variables::{VariableResolver, resolve_vars};
use crate::{ConfigError, ConfigResult};

/// Default config location, relative to the project root.
pub const CONFIG_PATH: &str = ".devspace/config.yaml";

/// Named config definitions, relative to the project root.
pub const CONFIGS_PATH: &str = ".devspace/configs.yaml";

/// Parse YAML text and resolve all placeholders in it.
pub fn resolve_document(content: &str, resolver: &mut VariableResolver<'_>) -> ConfigResult<Value> {
    let mut doc: Value = serde_yaml::from_str(content)?;
    resolve_vars(&mut doc, resolver)?;
    Ok(doc)
}

/// Deserialize a resolved document into the config schema.
pub fn parse_config(doc: Value) -> ConfigResult<Config> {
    if doc.is_null() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_value(doc)?)
}

/// Read a config file, resolve its variables and parse it.
pub fn load_config(path: &Path, resolver: &mut VariableResolver<'_>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })?;

    let doc = resolve_document(&content, resolver)?;
    let config = parse_config(doc)?;
    info!(
        path = %path.display(),
        images = config.images.as_ref().map_or(0, |i| i.len()),
        "Loaded config"
    );
    Ok(config)
}

/// Read `.devspace/configs.yaml`; a missing file yields no definitions.
pub fn load_config_definitions(path: &Path) -> ConfigResult<ConfigDefinitions> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(ConfigDefinitions::new()),
        Ok(content) => Ok(serde_yaml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config definitions");
            Ok(ConfigDefinitions::new())
        }
        Err(e) => Err(e.into()),
    }
}
