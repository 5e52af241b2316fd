//! Choosing a build backend for an image.
//!
//! An image is built with kaniko inside the cluster when `build.kaniko` is
//! set, even if `build.docker` is set as well. Everything else is built with
//! the docker daemon.

use async_trait::async_trait;
use bollard::Docker;
use devspace_config::{GeneratedConfig, ImageConfig};
use devspace_core::{Builder, Error, Result};
use tracing::info;

use crate::docker::DockerBuilder;
use crate::kaniko::KanikoBuilder;

/// Provides the default namespace for in-cluster builds.
pub trait NamespaceSource {
    fn default_namespace(&self) -> Result<String>;
}

/// Creates the clients builders talk to.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Docker daemon client, on minikube's daemon when preferred and available.
    async fn docker(&self, prefer_minikube: bool) -> Result<Docker>;

    async fn kube(&self) -> Result<kube::Client>;
}

/// Parameters of an in-cluster kaniko build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanikoPlan {
    pub image_name: String,
    pub image_tag: String,
    /// Tag of the last successful build, used as a cache hint.
    pub previous_tag: Option<String>,
    pub namespace: String,
    pub pull_secret: String,
    pub insecure: bool,
}

/// Parameters of a docker daemon build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerPlan {
    pub image_name: String,
    pub image_tag: String,
    pub prefer_minikube: bool,
}

/// The backend chosen for an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPlan {
    Kaniko(KanikoPlan),
    Docker(DockerPlan),
}

impl BuildPlan {
    pub fn backend(&self) -> &'static str {
        match self {
            BuildPlan::Kaniko(_) => "kaniko",
            BuildPlan::Docker(_) => "docker",
        }
    }
}

/// Decide how to build `image` with the given tag.
pub fn plan_builder(
    image: &ImageConfig,
    tag: &str,
    store: &GeneratedConfig,
    namespaces: &dyn NamespaceSource,
) -> Result<BuildPlan> {
    let build = image.build.as_ref();

    if let Some(kaniko) = build.and_then(|b| b.kaniko.as_ref()) {
        let namespace = match kaniko.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => ns.to_string(),
            None => default_namespace(image, namespaces)?,
        };

        return Ok(BuildPlan::Kaniko(KanikoPlan {
            image_name: image.name.clone(),
            image_tag: tag.to_string(),
            previous_tag: store.image_tag(&image.name).map(String::from),
            namespace,
            pull_secret: kaniko.pull_secret.clone().unwrap_or_default(),
            insecure: image.insecure.unwrap_or(false),
        }));
    }

    let prefer_minikube = build
        .and_then(|b| b.docker.as_ref())
        .and_then(|d| d.prefer_minikube)
        .unwrap_or(true);

    Ok(BuildPlan::Docker(DockerPlan {
        image_name: image.name.clone(),
        image_tag: tag.to_string(),
        prefer_minikube,
    }))
}

fn default_namespace(image: &ImageConfig, namespaces: &dyn NamespaceSource) -> Result<String> {
    let context = format!("image '{}': error retrieving default namespace", image.name);
    let namespace = namespaces.default_namespace().map_err(|e| e.context(&context))?;
    if namespace.is_empty() {
        return Err(Error::InvalidInput(format!("{context}: namespace is empty")));
    }
    Ok(namespace)
}

/// Assemble the builder for a plan.
pub async fn create_builder(plan: BuildPlan, clients: &dyn ClientFactory) -> Result<Box<dyn Builder>> {
    match plan {
        BuildPlan::Kaniko(plan) => {
            let docker = clients
                .docker(false)
                .await
                .map_err(|e| e.context("error creating docker client"))?;
            let kube = clients
                .kube()
                .await
                .map_err(|e| e.context("error creating kube client"))?;

            info!(
                image = %plan.image_name,
                namespace = %plan.namespace,
                "Using kaniko builder"
            );
            Ok(Box::new(KanikoBuilder::new(plan, docker, kube)))
        }
        BuildPlan::Docker(plan) => {
            let docker = clients
                .docker(plan.prefer_minikube)
                .await
                .map_err(|e| e.context("error creating docker client"))?;

            info!(image = %plan.image_name, "Using docker builder");
            Ok(Box::new(DockerBuilder::new(docker, plan.image_name, plan.image_tag)))
        }
    }
}
