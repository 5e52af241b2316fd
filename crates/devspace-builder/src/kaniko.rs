//! In-cluster kaniko builder.
//!
//! The build context is streamed into a kaniko pod over stdin. Kaniko pushes
//! the image itself, so `push_image` has nothing left to do.

use async_trait::async_trait;
use bollard::Docker;
use devspace_core::{BuildOptions, Builder, Error, RegistryAuth, Result};
use k8s_openapi::api::core::v1::{
    Container, KeyToPath, Pod, PodSpec, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, AttachParams, DeleteParams, LogParams, Patch, PatchParams, PostParams};
use kube::runtime::wait::await_condition;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::{credentials_for, docker_config_json};
use crate::context::archive_context;
use crate::docker::index_server;
use crate::select::KanikoPlan;

/// Kaniko executor image.
pub const KANIKO_IMAGE: &str = "gcr.io/kaniko-project/executor:v1.23.2";

const KANIKO_CONTAINER: &str = "kaniko";
const DOCKER_CONFIG_DIR: &str = "/kaniko/.docker";
const FIELD_MANAGER: &str = "devspace";
const START_TIMEOUT: Duration = Duration::from_secs(300);
const BUILD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Builds images inside the cluster with kaniko.
pub struct KanikoBuilder {
    plan: KanikoPlan,
    docker: Docker,
    client: Client,
}

impl KanikoBuilder {
    pub fn new(plan: KanikoPlan, docker: Docker, client: Client) -> Self {
        Self {
            plan,
            docker,
            client,
        }
    }

    /// Secret holding registry credentials for the kaniko pod.
    pub fn secret_name(&self) -> String {
        pull_secret_name(&self.plan)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.plan.namespace)
    }

    async fn wait_for_pod(
        &self,
        pods: &Api<Pod>,
        name: &str,
        dockerfile: &str,
        archive: Vec<u8>,
    ) -> Result<()> {
        let started = await_condition(pods.clone(), name, has_started);
        let pod = tokio::time::timeout(START_TIMEOUT, started)
            .await
            .map_err(|_| Error::BuildFailed(format!("build pod {} did not start", name)))?
            .map_err(|e| Error::Client(e.to_string()))?;

        // Pods rejected by kaniko can finish before the context is uploaded
        match pod_phase(pod.as_ref()) {
            Some("Succeeded") => return Ok(()),
            Some("Failed") => return Err(self.failure(pods, name).await),
            _ => {}
        }

        debug!(
            pod = %name,
            dockerfile = %dockerfile,
            bytes = archive.len(),
            "Uploading build context"
        );
        let attach = AttachParams::default()
            .container(KANIKO_CONTAINER)
            .stdin(true)
            .stdout(false)
            .stderr(false);
        let mut attached = pods
            .attach(name, &attach)
            .await
            .map_err(|e| Error::Client(format!("attach to {}: {}", name, e)))?;

        let mut stdin = attached
            .stdin()
            .ok_or_else(|| Error::Internal("attached pod has no stdin".to_string()))?;
        stdin.write_all(&archive).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let finished = await_condition(pods.clone(), name, has_finished);
        let pod = tokio::time::timeout(BUILD_TIMEOUT, finished)
            .await
            .map_err(|_| Error::BuildFailed(format!("build pod {} timed out", name)))?
            .map_err(|e| Error::Client(e.to_string()))?;
        attached.abort();

        if pod_phase(pod.as_ref()) == Some("Succeeded") {
            return Ok(());
        }
        Err(self.failure(pods, name).await)
    }

    /// Build error carrying the tail of the kaniko log.
    async fn failure(&self, pods: &Api<Pod>, name: &str) -> Error {
        let params = LogParams {
            container: Some(KANIKO_CONTAINER.to_string()),
            tail_lines: Some(20),
            ..Default::default()
        };
        let logs = match pods.logs(name, &params).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(pod = %name, error = %e, "Could not read build logs");
                String::new()
            }
        };
        Error::BuildFailed(format!(
            "{}: kaniko failed:\n{}",
            self.image_ref(),
            logs.trim_end()
        ))
    }
}

/// Pull secret configured for the plan, or one derived from the registry.
pub fn pull_secret_name(plan: &KanikoPlan) -> String {
    if !plan.pull_secret.is_empty() {
        return plan.pull_secret.clone();
    }

    let registry = crate::auth::registry_host(&plan.image_name).unwrap_or("docker-hub");
    let sanitized: String = registry
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("devspace-auth-{}", sanitized.trim_matches('-'))
}

/// Kaniko executor arguments.
pub fn kaniko_args(plan: &KanikoPlan, dockerfile: &str, options: &BuildOptions) -> Vec<String> {
    let mut args = vec![
        format!("--dockerfile={}", dockerfile),
        "--context=tar://stdin".to_string(),
        format!("--destination={}:{}", plan.image_name, plan.image_tag),
    ];

    if plan.previous_tag.is_some() && !options.no_cache {
        args.push("--cache=true".to_string());
        args.push(format!("--cache-repo={}", plan.image_name));
    }

    if plan.insecure {
        args.push("--insecure".to_string());
        args.push("--skip-tls-verify".to_string());
    }

    if let Some(target) = &options.target {
        args.push(format!("--target={}", target));
    }

    let mut build_args: Vec<_> = options.build_args.iter().collect();
    build_args.sort();
    for (key, value) in build_args {
        args.push(format!("--build-arg={}={}", key, value));
    }

    args
}

/// Pod that runs kaniko with the context on stdin.
pub fn build_pod(name: &str, secret: &str, args: Vec<String>) -> Pod {
    let labels = BTreeMap::from([(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    )]);

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: KANIKO_CONTAINER.to_string(),
                image: Some(KANIKO_IMAGE.to_string()),
                args: Some(args),
                stdin: Some(true),
                stdin_once: Some(true),
                volume_mounts: Some(vec![VolumeMount {
                    name: "registry-auth".to_string(),
                    mount_path: DOCKER_CONFIG_DIR.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: "registry-auth".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.to_string()),
                    items: Some(vec![KeyToPath {
                        key: ".dockerconfigjson".to_string(),
                        path: "config.json".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_phase(pod: Option<&Pod>) -> Option<&str> {
    pod.and_then(|p| p.status.as_ref())
        .and_then(|s| s.phase.as_deref())
}

/// Running, or already past running.
fn has_started(pod: Option<&Pod>) -> bool {
    matches!(pod_phase(pod), Some("Running" | "Succeeded" | "Failed"))
}

fn has_finished(pod: Option<&Pod>) -> bool {
    matches!(pod_phase(pod), Some("Succeeded" | "Failed"))
}

#[async_trait]
impl Builder for KanikoBuilder {
    fn name(&self) -> &'static str {
        "kaniko"
    }

    fn image_ref(&self) -> String {
        format!("{}:{}", self.plan.image_name, self.plan.image_tag)
    }

    /// Write the registry credentials into the build namespace.
    ///
    /// A pull secret named in the config is expected to exist already.
    async fn authenticate(&self) -> Result<RegistryAuth> {
        let index = index_server(&self.docker).await;
        let auth = credentials_for(&self.plan.image_name, &index)?;

        if !self.plan.pull_secret.is_empty() {
            debug!(secret = %self.plan.pull_secret, "Using existing pull secret");
            return Ok(auth);
        }

        let name = self.secret_name();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.plan.namespace.clone()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            string_data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                docker_config_json(&auth),
            )])),
            ..Default::default()
        };

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.plan.namespace);
        secrets
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&secret))
            .await
            .map_err(|e| Error::Client(format!("writing pull secret {}: {}", name, e)))?;

        info!(secret = %name, namespace = %self.plan.namespace, "Pull secret updated");
        Ok(auth)
    }

    async fn build_image(
        &self,
        context_path: &Path,
        dockerfile_path: &Path,
        options: &BuildOptions,
    ) -> Result<()> {
        let context = archive_context(context_path, dockerfile_path).await?;
        let args = kaniko_args(&self.plan, &context.dockerfile, options);

        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("devspace-build-{}", &id[..8]);
        let pod = build_pod(&name, &self.secret_name(), args);

        let pods = self.pods();
        pods.create(&PostParams::default(), &pod)
            .await
            .map_err(|e| Error::Client(format!("creating build pod: {}", e)))?;
        info!(
            image = %self.image_ref(),
            pod = %name,
            namespace = %self.plan.namespace,
            previous_tag = ?self.plan.previous_tag,
            "Building image with kaniko"
        );

        let result = self
            .wait_for_pod(&pods, &name, &context.dockerfile, context.archive)
            .await;

        if let Err(e) = pods.delete(&name, &DeleteParams::default()).await {
            warn!(pod = %name, error = %e, "Failed to delete build pod");
        }

        result?;
        info!(image = %self.image_ref(), "Image built and pushed");
        Ok(())
    }

    async fn push_image(&self) -> Result<()> {
        debug!(image = %self.image_ref(), "Kaniko pushed during build");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn plan() -> KanikoPlan {
        KanikoPlan {
            image_name: "gcr.io/acme/api".to_string(),
            image_tag: "abc1234".to_string(),
            previous_tag: None,
            namespace: "builds".to_string(),
            pull_secret: String::new(),
            insecure: false,
        }
    }

    #[test]
    fn test_minimal_args() {
        let args = kaniko_args(&plan(), "Dockerfile", &BuildOptions::default());
        assert_eq!(
            args,
            vec![
                "--dockerfile=Dockerfile",
                "--context=tar://stdin",
                "--destination=gcr.io/acme/api:abc1234",
            ]
        );
    }

    #[test]
    fn test_previous_tag_enables_cache() {
        let mut plan = plan();
        plan.previous_tag = Some("prev".to_string());

        let args = kaniko_args(&plan, "Dockerfile", &BuildOptions::default());
        assert!(args.contains(&"--cache=true".to_string()));
        assert!(args.contains(&"--cache-repo=gcr.io/acme/api".to_string()));

        let no_cache = BuildOptions {
            no_cache: true,
            ..Default::default()
        };
        let args = kaniko_args(&plan, "Dockerfile", &no_cache);
        assert!(!args.contains(&"--cache=true".to_string()));
    }

    #[test]
    fn test_insecure_and_options() {
        let mut plan = plan();
        plan.insecure = true;
        let options = BuildOptions {
            build_args: HashMap::from([
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
            ]),
            target: Some("release".to_string()),
            ..Default::default()
        };

        let args = kaniko_args(&plan, "docker/Dockerfile", &options);
        assert_eq!(
            &args[3..],
            &[
                "--insecure",
                "--skip-tls-verify",
                "--target=release",
                "--build-arg=A=1",
                "--build-arg=B=2",
            ]
        );
    }

    #[test]
    fn test_pull_secret_name() {
        assert_eq!(pull_secret_name(&plan()), "devspace-auth-gcr-io");

        let mut hub = plan();
        hub.image_name = "acme/api".to_string();
        assert_eq!(pull_secret_name(&hub), "devspace-auth-docker-hub");

        let mut local = plan();
        local.image_name = "localhost:5000/api".to_string();
        assert_eq!(pull_secret_name(&local), "devspace-auth-localhost-5000");

        let mut named = plan();
        named.pull_secret = "regcred".to_string();
        assert_eq!(pull_secret_name(&named), "regcred");
    }

    #[test]
    fn test_build_pod_mounts_secret() {
        let args = vec!["--context=tar://stdin".to_string()];
        let pod = build_pod("devspace-build-1", "regcred", args);
        let spec = pod.spec.unwrap();
        let container = &spec.containers[0];

        assert_eq!(container.image.as_deref(), Some(KANIKO_IMAGE));
        assert_eq!(container.stdin, Some(true));
        assert_eq!(container.stdin_once, Some(true));
        assert_eq!(
            container.volume_mounts.as_ref().unwrap()[0].mount_path,
            DOCKER_CONFIG_DIR
        );

        let volume = &spec.volumes.unwrap()[0];
        let secret = volume.secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("regcred"));
        assert_eq!(secret.items.as_ref().unwrap()[0].path, "config.json");
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
    }

    fn pod_in(phase: &str) -> Pod {
        Pod {
            status: Some(k8s_openapi::api::core::v1::PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_phase() {
        assert_eq!(pod_phase(None), None);
        assert_eq!(pod_phase(Some(&pod_in("Succeeded"))), Some("Succeeded"));
    }

    #[test]
    fn test_failed_pod_counts_as_started() {
        assert!(!has_started(None));
        assert!(!has_started(Some(&pod_in("Pending"))));
        assert!(has_started(Some(&pod_in("Running"))));
        assert!(has_started(Some(&pod_in("Failed"))));
        assert!(has_started(Some(&pod_in("Succeeded"))));
    }

    #[test]
    fn test_has_finished() {
        assert!(!has_finished(None));
        assert!(!has_finished(Some(&pod_in("Running"))));
        assert!(has_finished(Some(&pod_in("Failed"))));
        assert!(has_finished(Some(&pod_in("Succeeded"))));
    }
}
