//! Image builder contract.
//!
//! Builders turn a build context into a tagged image and publish it to a
//! registry. The orchestrator calls `authenticate`, `build_image` and
//! `push_image` in that order; a failing stage aborts only that image.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::Result;

/// Credentials for a container registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    /// Registry address as it appears in the docker config (e.g. `gcr.io`).
    pub server_address: String,
    /// Base64 encoded `user:password`, as stored in the docker config.
    pub auth: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Identity token for registries using OAuth refresh tokens.
    pub identity_token: Option<String>,
}

impl RegistryAuth {
    /// Credentials that carry nothing but the registry address.
    pub fn anonymous(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            ..Default::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.auth.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.identity_token.is_none()
    }
}

/// Options forwarded to the build backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// `--build-arg` values.
    pub build_args: HashMap<String, String>,
    /// Multi-stage build target.
    pub target: Option<String>,
    /// Network mode for RUN instructions.
    pub network_mode: Option<String>,
    /// Ignore any layer cache.
    pub no_cache: bool,
}

/// Trait for image build backends.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Name of this builder.
    fn name(&self) -> &'static str;

    /// Full image reference this builder produces (`name:tag`).
    fn image_ref(&self) -> String;

    /// Obtain registry credentials for the target image.
    async fn authenticate(&self) -> Result<RegistryAuth>;

    /// Build the image from a context directory and Dockerfile.
    async fn build_image(
        &self,
        context_path: &Path,
        dockerfile_path: &Path,
        options: &BuildOptions,
    ) -> Result<()>;

    /// Upload the built image to its registry.
    async fn push_image(&self) -> Result<()>;
}
