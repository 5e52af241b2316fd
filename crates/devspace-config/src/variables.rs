//! Variable resolution for configuration documents.
//!
//! A scalar is a placeholder only when the whole value is `${name}`:
//! - `image: ${IMAGE}` is resolved
//! - `image: gcr.io/${IMAGE}` is left alone
//!
//! Values are looked up in this order:
//! 1. `DEVSPACE_VAR_<NAME>` environment variable (non-empty)
//! 2. The active profile of the generated config
//! 3. The operator, whose answer is cached in the generated config

use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::prompt::{Prompt, PromptRequest};
use crate::schema::VariableDefinition;
use crate::store::{GeneratedConfig, StorePersistence};
use crate::value::{VarValue, coerce};
use crate::walk::walk;
use crate::{ConfigError, ConfigResult};

/// Prefix of environment variables that override config variables.
pub const VAR_ENV_PREFIX: &str = "DEVSPACE_VAR_";

// Regex for matching a scalar that is exactly one ${...} token
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\{[^}]+\}$").unwrap());

/// Whether a scalar is a placeholder token in its entirety.
pub fn is_placeholder(value: &str) -> bool {
    VAR_REGEX.is_match(value)
}

/// Variable name of a placeholder token, without delimiters and whitespace.
pub fn variable_name(token: &str) -> &str {
    token
        .strip_prefix("${")
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(token)
        .trim()
}

/// Environment variable that overrides `name`.
pub fn env_var_name(name: &str) -> String {
    format!("{}{}", VAR_ENV_PREFIX, name.to_uppercase())
}

/// Where environment overrides come from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The current process environment.
    #[default]
    Process,
    /// A fixed set of variables.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    /// Look up a variable; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Fixed(vars) => vars.get(key).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Resolves variables against the environment, the generated config and the operator.
pub struct VariableResolver<'a> {
    store: &'a mut GeneratedConfig,
    persistence: &'a dyn StorePersistence,
    prompt: &'a mut dyn Prompt,
    definitions: HashMap<String, VariableDefinition>,
    env: EnvSource,
}

impl<'a> VariableResolver<'a> {
    /// Create a resolver over a loaded store.
    ///
    /// `persistence` is used to save the store after every prompted answer.
    pub fn new(
        store: &'a mut GeneratedConfig,
        persistence: &'a dyn StorePersistence,
        prompt: &'a mut dyn Prompt,
    ) -> Self {
        Self {
            store,
            persistence,
            prompt,
            definitions: HashMap::new(),
            env: EnvSource::Process,
        }
    }

    pub fn with_definitions(mut self, definitions: HashMap<String, VariableDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Resolve a placeholder token such as `${IMAGE}`.
    pub fn resolve_token(&mut self, token: &str) -> ConfigResult<VarValue> {
        let name = variable_name(token);
        if name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: token.to_string(),
                message: "placeholder has no variable name".to_string(),
            });
        }
        self.resolve(name)
    }

    /// Resolve a variable by name.
    pub fn resolve(&mut self, name: &str) -> ConfigResult<VarValue> {
        if let Some(raw) = self.env.get(&env_var_name(name)) {
            debug!(variable = %name, "Resolved from environment");
            return Ok(coerce(&raw));
        }

        if let Some(value) = self.store.var(name) {
            debug!(variable = %name, "Resolved from generated config");
            return Ok(value.clone());
        }

        let request = PromptRequest::for_variable(name, self.definitions.get(name))?;
        let answer = self.prompt.ask(&request)?;
        let value = coerce(&answer);

        self.store.set_var(name, value.clone());
        self.persistence.save(&*self.store)?;
        debug!(variable = %name, "Resolved from prompt");

        Ok(value)
    }
}

/// Replace every placeholder scalar in `doc` with its resolved value.
pub fn resolve_vars(doc: &mut Value, resolver: &mut VariableResolver<'_>) -> ConfigResult<()> {
    walk(
        doc,
        |_, value| is_placeholder(value),
        |token| resolver.resolve_token(token).map(Value::from),
    )
}
