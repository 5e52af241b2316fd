//! Configuration loading for devspace.
//!
//! This crate handles:
//! - Config schema types
//! - The generated config (cached variables and image tags)
//! - Variable resolution from environment, cache and prompts

pub mod error;
pub mod loader;
pub mod prompt;
pub mod schema;
pub mod store;
pub mod value;
pub mod variables;
pub mod walk;

pub use error::{ConfigError, ConfigResult};
pub use prompt::{NonInteractive, Prompt, PromptRequest, TerminalPrompt};
pub use schema::{
    BuildConfig, BuildOptionsConfig, ClusterConfig, Config, ConfigDefinition, ConfigDefinitions,
    DockerConfig, ImageConfig, KanikoConfig, VariableDefinition,
};
pub use store::{FileStore, GeneratedConfig, ProfileCache, StorePersistence};
pub use value::{VarValue, coerce};
pub use variables::{EnvSource, VariableResolver, resolve_vars};
