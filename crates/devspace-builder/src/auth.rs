//! Registry credentials from the local docker config.

use devspace_core::{Error, RegistryAuth, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Index server used for images without a registry host.
pub const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    identitytoken: Option<String>,
}

/// Registry host of an image reference, `None` for Docker Hub images.
pub fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Some(first)
    } else {
        None
    }
}

/// Registry address to authenticate against for an image.
pub fn registry_server<'a>(image: &'a str, index_server: &'a str) -> &'a str {
    registry_host(image).unwrap_or(index_server)
}

/// Location of `config.json`, honouring `DOCKER_CONFIG`.
pub fn docker_config_path() -> Option<PathBuf> {
    match std::env::var("DOCKER_CONFIG") {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir).join("config.json")),
        _ => dirs::home_dir().map(|home| home.join(".docker").join("config.json")),
    }
}

/// Credentials for `server` from a docker config file.
///
/// A missing file or entry yields anonymous credentials.
pub fn load_credentials(config_path: &Path, server: &str) -> Result<RegistryAuth> {
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %config_path.display(), "No docker config found");
            return Ok(RegistryAuth::anonymous(server));
        }
        Err(e) => return Err(e.into()),
    };

    let config: DockerConfigFile = serde_json::from_str(&content).map_err(|e| {
        Error::InvalidInput(format!("invalid docker config {}: {}", config_path.display(), e))
    })?;

    let wanted = normalize_server(server);
    let entry = config
        .auths
        .iter()
        .find(|(key, _)| normalize_server(key) == wanted)
        .map(|(_, entry)| entry);

    match entry {
        Some(entry) => Ok(RegistryAuth {
            server_address: server.to_string(),
            auth: entry.auth.clone().filter(|a| !a.is_empty()),
            username: entry.username.clone(),
            password: entry.password.clone(),
            identity_token: entry.identitytoken.clone(),
        }),
        None => {
            if let Some(store) = &config.creds_store {
                warn!(
                    server = %server,
                    store = %store,
                    "Credential helpers are not supported, pushing anonymously"
                );
            }
            Ok(RegistryAuth::anonymous(server))
        }
    }
}

/// Credentials for an image, read from the default docker config.
pub fn credentials_for(image: &str, index_server: &str) -> Result<RegistryAuth> {
    let server = registry_server(image, index_server);
    match docker_config_path() {
        Some(path) => load_credentials(&path, server),
        None => Ok(RegistryAuth::anonymous(server)),
    }
}

/// Render credentials as a `.dockerconfigjson` document.
pub fn docker_config_json(auth: &RegistryAuth) -> String {
    let mut entry = serde_json::Map::new();
    let fields = [
        ("auth", &auth.auth),
        ("username", &auth.username),
        ("password", &auth.password),
        ("identitytoken", &auth.identity_token),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            entry.insert(key.to_string(), serde_json::Value::String(value.clone()));
        }
    }

    let mut auths = serde_json::Map::new();
    auths.insert(auth.server_address.clone(), serde_json::Value::Object(entry));
    serde_json::json!({ "auths": auths }).to_string()
}

fn normalize_server(server: &str) -> &str {
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server);
    match server.split_once('/') {
        Some((host, _)) => host,
        None => server,
    }
}
