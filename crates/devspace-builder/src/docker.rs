//! Docker daemon builder.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions};
use bytes::Bytes;
use devspace_core::{BuildOptions, Builder, Error, RegistryAuth, Result};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{DOCKER_HUB_INDEX, credentials_for};
use crate::context::archive_context;

/// Builds images with a docker daemon and pushes them from there.
pub struct DockerBuilder {
    docker: Docker,
    image_name: String,
    image_tag: String,
    auth: Mutex<Option<RegistryAuth>>,
}

impl DockerBuilder {
    pub fn new(docker: Docker, image_name: impl Into<String>, image_tag: impl Into<String>) -> Self {
        Self {
            docker,
            image_name: image_name.into(),
            image_tag: image_tag.into(),
            auth: Mutex::new(None),
        }
    }

    async fn credentials(&self) -> Result<RegistryAuth> {
        let cached = self.auth.lock().ok().and_then(|auth| auth.clone());
        match cached {
            Some(auth) => Ok(auth),
            None => self.authenticate().await,
        }
    }
}

/// Registry index the daemon is configured with.
pub(crate) async fn index_server(docker: &Docker) -> String {
    match docker.info().await {
        Ok(info) => info
            .index_server_address
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DOCKER_HUB_INDEX.to_string()),
        Err(e) => {
            warn!(error = %e, "Could not query docker info, assuming Docker Hub");
            DOCKER_HUB_INDEX.to_string()
        }
    }
}

/// Convert registry credentials into the daemon's format.
pub fn docker_credentials(auth: &RegistryAuth) -> DockerCredentials {
    DockerCredentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        auth: auth.auth.clone(),
        serveraddress: Some(auth.server_address.clone()),
        identitytoken: auth.identity_token.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    async fn authenticate(&self) -> Result<RegistryAuth> {
        let index = index_server(&self.docker).await;
        let auth = credentials_for(&self.image_name, &index)?;

        if auth.is_anonymous() {
            warn!(registry = %auth.server_address, "No credentials found for registry");
        } else {
            debug!(registry = %auth.server_address, "Found registry credentials");
        }

        if let Ok(mut cached) = self.auth.lock() {
            *cached = Some(auth.clone());
        }
        Ok(auth)
    }

    async fn build_image(
        &self,
        context_path: &Path,
        dockerfile_path: &Path,
        options: &BuildOptions,
    ) -> Result<()> {
        let context = archive_context(context_path, dockerfile_path).await?;
        let auth = self.credentials().await?;

        let build_options = BuildImageOptions {
            dockerfile: context.dockerfile.clone(),
            t: self.image_ref(),
            buildargs: options.build_args.clone(),
            target: options.target.clone().unwrap_or_default(),
            networkmode: options.network_mode.clone().unwrap_or_default(),
            nocache: options.no_cache,
            rm: true,
            ..Default::default()
        };

        let mut registry_config = HashMap::new();
        if !auth.is_anonymous() {
            registry_config.insert(auth.server_address.clone(), docker_credentials(&auth));
        }

        info!(image = %self.image_ref(), context = %context_path.display(), "Building image");
        let mut stream = self.docker.build_image(
            build_options,
            Some(registry_config),
            Some(Bytes::from(context.archive)),
        );

        while let Some(result) = stream.next().await {
            let info =
                result.map_err(|e| Error::BuildFailed(format!("{}: {}", self.image_ref(), e)))?;
            if let Some(error) = info.error {
                return Err(Error::BuildFailed(format!("{}: {}", self.image_ref(), error)));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(output = %line, "Build output");
                }
            }
        }

        info!(image = %self.image_ref(), "Image built");
        Ok(())
    }

    async fn push_image(&self) -> Result<()> {
        let auth = self.credentials().await?;
        let options = PushImageOptions {
            tag: self.image_tag.clone(),
        };

        info!(image = %self.image_ref(), "Pushing image");
        let credentials = docker_credentials(&auth);
        let mut stream = self
            .docker
            .push_image(&self.image_name, Some(options), Some(credentials));

        while let Some(result) = stream.next().await {
            let info =
                result.map_err(|e| Error::PushFailed(format!("{}: {}", self.image_ref(), e)))?;
            if let Some(error) = info.error {
                return Err(Error::PushFailed(format!("{}: {}", self.image_ref(), error)));
            }
            if let Some(status) = info.status {
                debug!(status = %status, "Push progress");
            }
        }

        info!(image = %self.image_ref(), "Image pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::API_DEFAULT_VERSION;

    fn builder() -> DockerBuilder {
        // Connecting over http is lazy, no daemon needed until a request is made
        let docker =
            Docker::connect_with_http("http://127.0.0.1:2375", 5, API_DEFAULT_VERSION).unwrap();
        DockerBuilder::new(docker, "gcr.io/acme/api", "abc1234")
    }

    #[tokio::test]
    async fn test_image_ref() {
        let builder = builder();
        assert_eq!(builder.image_ref(), "gcr.io/acme/api:abc1234");
        assert_eq!(builder.name(), "docker");
    }

    #[test]
    fn test_docker_credentials_conversion() {
        let auth = RegistryAuth {
            auth: Some("dXNlcjpwYXNz".to_string()),
            ..RegistryAuth::anonymous("gcr.io")
        };
        let creds = docker_credentials(&auth);
        assert_eq!(creds.serveraddress.as_deref(), Some("gcr.io"));
        assert_eq!(creds.auth.as_deref(), Some("dXNlcjpwYXNz"));
        assert!(creds.username.is_none());
    }
}

/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    #[ignore]
    async fn test_build_local_image() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            "FROM alpine:latest\nARG GREETING\nRUN echo $GREETING > /greeting\n",
        )
        .unwrap();

        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = DockerBuilder::new(docker, "devspace-test/greeting", "it");

        let mut options = BuildOptions::default();
        options
            .build_args
            .insert("GREETING".to_string(), "hello".to_string());

        builder.authenticate().await.unwrap();
        builder
            .build_image(dir.path(), &dir.path().join("Dockerfile"), &options)
            .await
            .expect("Should build image");
    }

    #[tokio::test]
    #[ignore]
    async fn test_broken_dockerfile_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine:latest\nRUN exit 3\n").unwrap();

        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = DockerBuilder::new(docker, "devspace-test/broken", "it");

        let err = builder
            .build_image(dir.path(), &dir.path().join("Dockerfile"), &BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BuildFailed(_)));
    }
}
