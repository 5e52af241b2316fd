//! Image build command.

use anyhow::{Context, Result};
use devspace_builder::context::resolve_path;
use devspace_builder::{
    BuildPlan, ClientFactory, ClusterNamespace, DefaultClients, create_builder, plan_builder,
};
use devspace_config::{BuildOptionsConfig, ImageConfig, StorePersistence};
use devspace_core::BuildOptions;
use std::path::Path;
use tracing::{error, info};

use super::Project;

const DEFAULT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_CONTEXT: &str = ".";
const TAG_LENGTH: usize = 7;

/// Build all images of the active config, or only `only` when given.
pub async fn run(project: &Project, only: Option<String>, skip_push: bool) -> Result<()> {
    let store_file = project.store();
    let mut store = store_file
        .load()
        .context("Failed to load generated config")?;
    let config = project.load_config(&mut store)?;

    let images = select_images(config.images.clone().unwrap_or_default(), only.as_deref());
    if images.is_empty() {
        match only {
            Some(filter) => anyhow::bail!("No image matches '{}'", filter),
            None => anyhow::bail!("No images configured"),
        }
    }

    let namespaces = ClusterNamespace::from_config(&config);
    let clients = DefaultClients::new(config.cluster.and_then(|c| c.kube_context));

    let mut failures = Vec::new();
    for (key, image) in &images {
        let tag = image.tag.clone().unwrap_or_else(random_tag);

        let built = match plan_builder(image, &tag, &store, &namespaces) {
            Ok(plan) => {
                println!("▶ Building '{}' with {}", key, plan.backend());
                build_one(plan, &clients, project.root(), image, skip_push).await
            }
            Err(e) => Err(e),
        };

        match built {
            Ok(()) => {
                store.set_image_tag(image.name.clone(), tag.clone());
                store_file
                    .save(&store)
                    .context("Failed to save generated config")?;
                println!("✓ {}:{}", image.name, tag);
            }
            Err(e) => {
                error!(image = %key, error = %e, "Image build failed");
                println!("✗ {} - {}", key, e);
                failures.push(key.clone());
            }
        }
    }

    if failures.is_empty() {
        info!(count = images.len(), "All images built");
        Ok(())
    } else {
        anyhow::bail!("Failed to build: {}", failures.join(", "));
    }
}

async fn build_one(
    plan: BuildPlan,
    clients: &dyn ClientFactory,
    root: &Path,
    image: &ImageConfig,
    skip_push: bool,
) -> devspace_core::Result<()> {
    let builder = create_builder(plan, clients).await?;
    let context = resolve_path(root, image.context.as_deref().unwrap_or(DEFAULT_CONTEXT));
    let dockerfile = resolve_path(
        root,
        image.dockerfile.as_deref().unwrap_or(DEFAULT_DOCKERFILE),
    );

    builder.authenticate().await?;
    builder
        .build_image(&context, &dockerfile, &build_options(image))
        .await?;

    if skip_push || image.skip_push.unwrap_or(false) {
        info!(image = %builder.image_ref(), "Skipping push");
        return Ok(());
    }
    builder.push_image().await
}

/// Images whose config key or repository name equals `only`, all when unset.
fn select_images(
    images: impl IntoIterator<Item = (String, ImageConfig)>,
    only: Option<&str>,
) -> Vec<(String, ImageConfig)> {
    images
        .into_iter()
        .filter(|(key, image)| only.is_none_or(|f| key == f || image.name == f))
        .collect()
}

fn build_options(image: &ImageConfig) -> BuildOptions {
    let configured = image
        .build
        .as_ref()
        .and_then(|b| b.options.clone())
        .unwrap_or_else(BuildOptionsConfig::default);

    BuildOptions {
        build_args: configured.build_args,
        target: configured.target,
        network_mode: configured.network,
        no_cache: false,
    }
}

fn random_tag() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..TAG_LENGTH].to_string()
}
