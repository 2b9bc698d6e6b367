//! Kubernetes operations

pub mod client;
pub mod credentials;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod kubectl;
pub mod types;

pub use client::{ClusterClient, KubeClusterClient};
pub use error::{ClientError, CredentialsError};
pub use kubectl::{DirectApi, Kubectl};
pub use types::{
    NamespaceCondition, NamespacePhase, NamespaceSnapshot, ObjectRef, ResourceType, ResourceView,
    ServiceRef, WebhookConfiguration, WebhookKind, well_known,
};
