//! Persisted variable cache (`.devspace/generated.yaml`).
//!
//! The store keeps one profile per config name. Variables answered at a
//! prompt and the last built tag of every image live in the active profile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::value::VarValue;
use crate::{ConfigError, ConfigResult};

/// Name of the profile used when none is set.
pub const DEFAULT_PROFILE: &str = "default";

/// Default location of the generated config, relative to the project root.
pub const GENERATED_CONFIG_PATH: &str = ".devspace/generated.yaml";

/// The whole persisted store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConfig {
    #[serde(default = "default_profile")]
    pub active_config: String,
    #[serde(default)]
    pub configs: HashMap<String, ProfileCache>,
}

/// Cached state of a single profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCache {
    #[serde(default)]
    pub vars: HashMap<String, VarValue>,
    #[serde(default)]
    pub image_tags: HashMap<String, String>,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for GeneratedConfig {
    fn default() -> Self {
        Self {
            active_config: default_profile(),
            configs: HashMap::new(),
        }
    }
}

impl GeneratedConfig {
    /// The active profile, if anything has been recorded for it yet.
    pub fn active(&self) -> Option<&ProfileCache> {
        self.configs.get(&self.active_config)
    }

    /// The active profile, created on demand.
    pub fn active_mut(&mut self) -> &mut ProfileCache {
        self.configs.entry(self.active_config.clone()).or_default()
    }

    /// Switch the active profile.
    pub fn set_active(&mut self, name: impl Into<String>) {
        self.active_config = name.into();
    }

    pub fn var(&self, name: &str) -> Option<&VarValue> {
        self.active().and_then(|p| p.vars.get(name))
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: VarValue) {
        self.active_mut().vars.insert(name.into(), value);
    }

    pub fn remove_var(&mut self, name: &str) -> Option<VarValue> {
        self.configs
            .get_mut(&self.active_config)
            .and_then(|p| p.vars.remove(name))
    }

    /// Forget every cached variable of the active profile.
    pub fn clear_vars(&mut self) {
        if let Some(profile) = self.configs.get_mut(&self.active_config) {
            profile.vars.clear();
        }
    }

    /// The tag recorded for an image by its last successful build.
    pub fn image_tag(&self, image: &str) -> Option<&str> {
        self.active()
            .and_then(|p| p.image_tags.get(image))
            .map(|s| s.as_str())
    }

    pub fn set_image_tag(&mut self, image: impl Into<String>, tag: impl Into<String>) {
        self.active_mut().image_tags.insert(image.into(), tag.into());
    }
}

/// Loads and saves the generated config.
pub trait StorePersistence {
    fn load(&self) -> ConfigResult<GeneratedConfig>;

    fn save(&self, config: &GeneratedConfig) -> ConfigResult<()>;
}

/// YAML file backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `.devspace/generated.yaml` under the given project root.
    pub fn in_project(root: &Path) -> Self {
        Self::new(root.join(GENERATED_CONFIG_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorePersistence for FileStore {
    fn load(&self) -> ConfigResult<GeneratedConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No generated config yet");
                return Ok(GeneratedConfig::default());
            }
            Err(e) => {
                return Err(ConfigError::Persistence(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(GeneratedConfig::default());
        }

        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::Persistence(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, config: &GeneratedConfig) -> ConfigResult<()> {
        let content = serde_yaml::to_string(config)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::Persistence(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        std::fs::write(&self.path, content).map_err(|e| {
            ConfigError::Persistence(format!("failed to write {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "Saved generated config");
        Ok(())
    }
}
