//! Cluster and daemon connections.

use async_trait::async_trait;
use bollard::{API_DEFAULT_VERSION, Docker};
use devspace_config::Config;
use devspace_core::{Error, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::select::{ClientFactory, NamespaceSource};

/// Namespace used when the kube context does not set one.
pub const FALLBACK_NAMESPACE: &str = "default";

const MINIKUBE_CONTEXT: &str = "minikube";
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Name of the current kube context, if a kubeconfig exists.
pub fn current_context() -> Option<String> {
    Kubeconfig::read().ok().and_then(|k| k.current_context)
}

/// Default namespace of a context in a kubeconfig.
///
/// Uses `context` if given, otherwise the current context. A context without
/// a namespace maps to `default`.
pub fn namespace_from_kubeconfig(kubeconfig: &Kubeconfig, context: Option<&str>) -> Result<String> {
    let name = context
        .map(String::from)
        .or_else(|| kubeconfig.current_context.clone())
        .ok_or_else(|| Error::InvalidInput("kubeconfig has no current context".to_string()))?;

    let named = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| Error::NotFound(format!("kube context '{}'", name)))?;

    Ok(named
        .context
        .as_ref()
        .and_then(|c| c.namespace.clone())
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| FALLBACK_NAMESPACE.to_string()))
}

/// Default namespace from the config's cluster section or the kubeconfig.
#[derive(Debug, Clone, Default)]
pub struct ClusterNamespace {
    configured: Option<String>,
    kube_context: Option<String>,
}

impl ClusterNamespace {
    pub fn new(configured: Option<String>, kube_context: Option<String>) -> Self {
        Self {
            configured,
            kube_context,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let cluster = config.cluster.as_ref();
        Self::new(
            cluster.and_then(|c| c.namespace.clone()),
            cluster.and_then(|c| c.kube_context.clone()),
        )
    }
}

impl NamespaceSource for ClusterNamespace {
    fn default_namespace(&self) -> Result<String> {
        if let Some(ns) = self.configured.as_ref().filter(|ns| !ns.is_empty()) {
            return Ok(ns.clone());
        }

        let kubeconfig = Kubeconfig::read()
            .map_err(|e| Error::InvalidInput(format!("cannot read kubeconfig: {e}")))?;
        namespace_from_kubeconfig(&kubeconfig, self.kube_context.as_deref())
    }
}

/// Parse `minikube docker-env --shell none` output.
pub fn parse_docker_env(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

async fn minikube_docker_env() -> Result<HashMap<String, String>> {
    let mut command = Command::new("minikube");
    command.args(["docker-env", "--shell", "none"]);
    read_docker_env(command).await
}

/// Run a `docker-env` style command and parse its `KEY=value` output.
async fn read_docker_env(mut command: Command) -> Result<HashMap<String, String>> {
    let output = command.kill_on_drop(true).output().await?;

    if !output.status.success() {
        return Err(Error::Client(format!(
            "minikube docker-env failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_docker_env(&String::from_utf8_lossy(&output.stdout)))
}

fn connect_with_env(env: &HashMap<String, String>) -> Result<Docker> {
    let host = env
        .get("DOCKER_HOST")
        .ok_or_else(|| Error::Client("minikube did not report DOCKER_HOST".to_string()))?;

    let tls = env.get("DOCKER_TLS_VERIFY").is_some_and(|v| v == "1");
    let docker = match (tls, env.get("DOCKER_CERT_PATH")) {
        (true, Some(cert_path)) => {
            let certs = Path::new(cert_path);
            Docker::connect_with_ssl(
                host,
                &certs.join("key.pem"),
                &certs.join("cert.pem"),
                &certs.join("ca.pem"),
                DOCKER_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )
        }
        _ => Docker::connect_with_http(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION),
    };

    docker.map_err(|e| Error::Client(e.to_string()))
}

/// Connect to the docker daemon, preferring minikube's when asked and active.
pub async fn connect_docker(prefer_minikube: bool) -> Result<Docker> {
    if prefer_minikube && current_context().as_deref() == Some(MINIKUBE_CONTEXT) {
        let minikube = match minikube_docker_env().await {
            Ok(env) => connect_with_env(&env),
            Err(e) => Err(e),
        };
        match minikube {
            Ok(docker) => {
                info!("Using minikube docker daemon");
                return Ok(docker);
            }
            Err(e) => warn!(error = %e, "Falling back to local docker daemon"),
        }
    }

    debug!("Using local docker daemon");
    Docker::connect_with_local_defaults().map_err(|e| Error::Client(e.to_string()))
}

/// Real docker and kube clients.
#[derive(Debug, Clone, Default)]
pub struct DefaultClients {
    kube_context: Option<String>,
}

impl DefaultClients {
    pub fn new(kube_context: Option<String>) -> Self {
        Self { kube_context }
    }
}

#[async_trait]
impl ClientFactory for DefaultClients {
    async fn docker(&self, prefer_minikube: bool) -> Result<Docker> {
        connect_docker(prefer_minikube).await
    }

    async fn kube(&self) -> Result<kube::Client> {
        let config = match &self.kube_context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| Error::Client(e.to_string()))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| Error::Client(e.to_string()))?,
        };

        kube::Client::try_from(config).map_err(|e| Error::Client(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: local
    cluster:
      server: https://127.0.0.1:6443
users:
  - name: admin
    user: {}
contexts:
  - name: dev
    context:
      cluster: local
      user: admin
      namespace: team-a
  - name: bare
    context:
      cluster: local
      user: admin
"#;

    #[test]
    fn test_namespace_from_current_context() {
        let kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        assert_eq!(namespace_from_kubeconfig(&kubeconfig, None).unwrap(), "team-a");
    }

    #[test]
    fn test_context_without_namespace_uses_default() {
        let kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        assert_eq!(
            namespace_from_kubeconfig(&kubeconfig, Some("bare")).unwrap(),
            FALLBACK_NAMESPACE
        );
    }

    #[test]
    fn test_unknown_context_is_error() {
        let kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        assert!(matches!(
            namespace_from_kubeconfig(&kubeconfig, Some("prod")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_no_current_context_is_error() {
        let kubeconfig = Kubeconfig::default();
        assert!(matches!(
            namespace_from_kubeconfig(&kubeconfig, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_configured_namespace_wins() {
        let source = ClusterNamespace::new(Some("builds".to_string()), Some("missing".to_string()));
        assert_eq!(source.default_namespace().unwrap(), "builds");
    }

    #[test]
    fn test_parse_docker_env() {
        let env = parse_docker_env(
            "DOCKER_TLS_VERIFY=1\nDOCKER_HOST=tcp://192.168.49.2:2376\nDOCKER_CERT_PATH=/home/dev/.minikube/certs\nMINIKUBE_ACTIVE_DOCKERD=minikube\n",
        );
        assert_eq!(env["DOCKER_HOST"], "tcp://192.168.49.2:2376");
        assert_eq!(env["DOCKER_TLS_VERIFY"], "1");
        assert_eq!(env.len(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_docker_env_from_command() {
        let mut command = Command::new("sh");
        command.args([
            "-c",
            "printf 'DOCKER_HOST=tcp://192.168.49.2:2376\\nDOCKER_TLS_VERIFY=0\\n'",
        ]);

        let env = read_docker_env(command).await.unwrap();
        assert_eq!(env["DOCKER_HOST"], "tcp://192.168.49.2:2376");
        assert_eq!(env["DOCKER_TLS_VERIFY"], "0");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_docker_env_failure_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo 'cluster stopped' >&2; exit 1"]);

        let err = read_docker_env(command).await.unwrap_err();
        assert!(matches!(err, Error::Client(_)));
        assert!(err.to_string().contains("cluster stopped"));
    }

    #[tokio::test]
    async fn test_read_docker_env_missing_binary() {
        let command = Command::new("devspace-no-such-minikube");
        assert!(matches!(read_docker_env(command).await, Err(Error::Io(_))));
    }

    #[test]
    fn test_connect_with_env_requires_host() {
        let env = HashMap::from([("DOCKER_TLS_VERIFY".to_string(), "0".to_string())]);
        assert!(matches!(connect_with_env(&env), Err(Error::Client(_))));
    }
}
