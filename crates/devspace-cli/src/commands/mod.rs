//! CLI command implementations.

pub mod build;
pub mod vars;

use anyhow::{Context, Result};
use devspace_config::loader::{CONFIG_PATH, CONFIGS_PATH, load_config_definitions, parse_config};
use devspace_config::{
    Config, ConfigDefinition, FileStore, GeneratedConfig, NonInteractive, Prompt, StorePersistence,
    TerminalPrompt, VariableResolver,
};
use std::path::{Path, PathBuf};

/// Paths and settings shared by all commands.
pub struct Project {
    root: PathBuf,
    config: Option<PathBuf>,
    no_prompt: bool,
}

impl Project {
    pub fn new(root: PathBuf, config: Option<PathBuf>, no_prompt: bool) -> Self {
        Self {
            root,
            config,
            no_prompt,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> FileStore {
        FileStore::in_project(&self.root)
    }

    /// Definition of the active config from `.devspace/configs.yaml`.
    fn definition(&self, active: &str) -> Result<ConfigDefinition> {
        let path = self.root.join(CONFIGS_PATH);
        let definitions = load_config_definitions(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(definitions.get(active).cloned().unwrap_or_default())
    }

    fn config_path(&self, definition: &ConfigDefinition) -> PathBuf {
        match (&self.config, &definition.config) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => self.root.join(path),
            (None, None) => self.root.join(CONFIG_PATH),
        }
    }

    /// Read the active config and resolve its variables.
    pub fn resolve_document(&self, store: &mut GeneratedConfig) -> Result<serde_yaml::Value> {
        let definition = self.definition(&store.active_config)?;
        let path = self.config_path(&definition);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let persistence = self.store();
        let mut terminal = TerminalPrompt::new();
        let mut unattended = NonInteractive;
        let prompt: &mut dyn Prompt = if self.no_prompt {
            &mut unattended
        } else {
            &mut terminal
        };

        let mut resolver = VariableResolver::new(store, &persistence, prompt)
            .with_definitions(definition.variables());
        devspace_config::loader::resolve_document(&content, &mut resolver)
            .with_context(|| format!("Failed to resolve variables in {}", path.display()))
    }

    /// Read, resolve and parse the active config.
    pub fn load_config(&self, store: &mut GeneratedConfig) -> Result<Config> {
        let doc = self.resolve_document(store)?;
        parse_config(doc).context("Failed to parse config")
    }
}

/// Print the resolved config.
pub fn resolve(project: &Project) -> Result<()> {
    let mut store = project
        .store()
        .load()
        .context("Failed to load generated config")?;
    let doc = project.resolve_document(&mut store)?;
    print!("{}", serde_yaml::to_string(&doc)?);
    Ok(())
}
