//! Typed configuration schema.
//!
//! These types are deserialized from the document after all variables have
//! been resolved.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Project configuration (`.devspace/config.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    /// Images keyed by their config name.
    #[serde(default)]
    pub images: Option<BTreeMap<String, ImageConfig>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub namespace: Option<String>,
    pub kube_context: Option<String>,
}

/// A single image to build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Repository name, e.g. `gcr.io/acme/api`.
    pub name: String,
    /// Fixed tag; a fresh one is generated per build when unset.
    pub tag: Option<String>,
    pub dockerfile: Option<String>,
    pub context: Option<String>,
    /// Allow pushing to registries without valid TLS.
    pub insecure: Option<bool>,
    pub skip_push: Option<bool>,
    pub build: Option<BuildConfig>,
}

/// Backend selection. `kaniko` wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub kaniko: Option<KanikoConfig>,
    pub docker: Option<DockerConfig>,
    pub options: Option<BuildOptionsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanikoConfig {
    pub namespace: Option<String>,
    pub pull_secret: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    pub prefer_minikube: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptionsConfig {
    #[serde(default)]
    pub build_args: HashMap<String, String>,
    pub target: Option<String>,
    pub network: Option<String>,
}

/// Describes how to ask for a variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VariableDefinition {
    pub name: String,
    pub question: Option<String>,
    pub default: Option<String>,
    pub regex_pattern: Option<String>,
}

/// Named configs (`.devspace/configs.yaml`).
pub type ConfigDefinitions = BTreeMap<String, ConfigDefinition>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigDefinition {
    /// Path of the config file for this profile.
    pub config: Option<String>,
    #[serde(default)]
    pub vars: Vec<VariableDefinition>,
}

impl ConfigDefinition {
    /// Variable definitions keyed by name.
    pub fn variables(&self) -> HashMap<String, VariableDefinition> {
        self.vars
            .iter()
            .map(|v| (v.name.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_config() {
        let yaml = r#"
version: v1alpha1
cluster:
  namespace: dev
images:
  api:
    name: gcr.io/acme/api
    insecure: true
    build:
      kaniko:
        namespace: builds
        pullSecret: regcred
      options:
        buildArgs:
          VERSION: "1.0"
        target: release
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let images = config.images.unwrap();
        let api = &images["api"];

        assert_eq!(api.name, "gcr.io/acme/api");
        assert_eq!(api.insecure, Some(true));
        let build = api.build.as_ref().unwrap();
        let kaniko = build.kaniko.as_ref().unwrap();
        assert_eq!(kaniko.namespace.as_deref(), Some("builds"));
        assert_eq!(kaniko.pull_secret.as_deref(), Some("regcred"));
        assert_eq!(
            build.options.as_ref().unwrap().build_args["VERSION"],
            "1.0"
        );
        assert_eq!(config.cluster.unwrap().namespace.as_deref(), Some("dev"));
    }

    #[test]
    fn test_parse_docker_build() {
        let yaml = "name: web\nbuild:\n  docker:\n    preferMinikube: false\n";
        let image: ImageConfig = serde_yaml::from_str(yaml).unwrap();
        let docker = image.build.unwrap().docker.unwrap();
        assert_eq!(docker.prefer_minikube, Some(false));
    }

    #[test]
    fn test_config_definitions_are_strict() {
        let yaml = r#"
default:
  config: .devspace/config.yaml
  vars:
    - name: registry
      question: Which registry?
      default: docker.io
      regexPattern: "^[a-z.]+$"
"#;
        let defs: ConfigDefinitions = serde_yaml::from_str(yaml).unwrap();
        let vars = defs["default"].variables();
        assert_eq!(vars["registry"].default.as_deref(), Some("docker.io"));

        let unknown = "default:\n  vars:\n    - name: x\n      prompt: typo\n";
        assert!(serde_yaml::from_str::<ConfigDefinitions>(unknown).is_err());
    }
}
