//! Image build backends for devspace.
//!
//! Provides builder implementations for container images:
//! - Kaniko (in-cluster builds)
//! - Docker daemon (local or minikube)
//!
//! and the selection logic that picks one per image.

pub mod auth;
pub mod cluster;
pub mod context;
pub mod docker;
pub mod kaniko;
pub mod select;

pub use cluster::{ClusterNamespace, DefaultClients};
pub use devspace_core::builder::{BuildOptions, Builder, RegistryAuth};
pub use docker::DockerBuilder;
pub use kaniko::KanikoBuilder;
pub use select::{
    BuildPlan, ClientFactory, DockerPlan, KanikoPlan, NamespaceSource, create_builder, plan_builder,
};
