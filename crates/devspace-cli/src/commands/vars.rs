//! Cached variable commands.

use anyhow::{Context, Result};
use devspace_config::{GeneratedConfig, StorePersistence, VarValue};

use super::Project;

/// Print the cached variables of the active config.
pub fn list(project: &Project) -> Result<()> {
    let store = project
        .store()
        .load()
        .context("Failed to load generated config")?;

    let vars = cached_vars(&store);
    if vars.is_empty() {
        println!("No cached variables for config '{}'", store.active_config);
        return Ok(());
    }

    println!("Config '{}':", store.active_config);
    for (name, value) in vars {
        println!("  {} = {}", name, value);
    }
    Ok(())
}

/// Forget the cached variables of the active config so they are asked again.
pub fn reset(project: &Project) -> Result<()> {
    let persistence = project.store();
    let mut store = persistence
        .load()
        .context("Failed to load generated config")?;

    store.clear_vars();
    persistence
        .save(&store)
        .context("Failed to save generated config")?;

    println!("✓ Cleared variables of config '{}'", store.active_config);
    Ok(())
}

/// Make `name` the active config.
pub fn use_config(project: &Project, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Config name must not be empty");
    }

    let persistence = project.store();
    let mut store = persistence
        .load()
        .context("Failed to load generated config")?;

    store.set_active(name.trim());
    persistence
        .save(&store)
        .context("Failed to save generated config")?;

    println!("✓ Using config '{}'", store.active_config);
    Ok(())
}

/// Cached variables of the active config, sorted by name.
fn cached_vars(store: &GeneratedConfig) -> Vec<(&str, &VarValue)> {
    let mut vars: Vec<_> = store
        .active()
        .map(|profile| {
            profile
                .vars
                .iter()
                .map(|(name, value)| (name.as_str(), value))
                .collect()
        })
        .unwrap_or_default();
    vars.sort_by(|a, b| a.0.cmp(b.0));
    vars
}
