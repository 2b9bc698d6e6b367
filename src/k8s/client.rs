//! Resource Client Facade
//!
//! Every cluster interaction of the remediation engine goes through
//! [`ClusterClient`]. The production implementation talks to the API server
//! with kube-rs; tests substitute an in-memory cluster.

use super::error::ClientError;
use super::types::{
    NamespaceCondition, NamespacePhase, NamespaceSnapshot, ObjectRef, ResourceType, ResourceView,
    ServiceRef, WebhookConfiguration, WebhookKind,
};
use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, warn};

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fresh namespace read; `None` when it does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceSnapshot>, ClientError>;

    async fn delete_namespace(&self, name: &str) -> Result<(), ClientError>;

    /// Update the namespace `finalize` subresource with every finalizer cleared
    async fn finalize_namespace(&self, name: &str) -> Result<(), ClientError>;

    /// All resource types the server advertises, one group-version per group.
    /// Groups that fail discovery are skipped.
    async fn discover_resource_types(&self) -> Result<Vec<ResourceType>, ClientError>;

    /// List instances of a type, in one namespace or cluster wide
    async fn list(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, ClientError>;

    async fn get(&self, object: &ObjectRef) -> Result<ResourceView, ClientError>;

    async fn patch_merge(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError>;

    async fn patch_json(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError>;

    /// Full-object update; the view's resourceVersion guards against blind overwrites
    async fn replace(&self, object: &ObjectRef, view: &ResourceView) -> Result<(), ClientError>;

    async fn delete(&self, object: &ObjectRef, grace_period: Option<u32>)
    -> Result<(), ClientError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookConfiguration>, ClientError>;

    async fn delete_webhook(&self, kind: WebhookKind, name: &str) -> Result<(), ClientError>;

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ClientError>;
}

/// [`ClusterClient`] backed by a live API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, resource: &ResourceType, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(resource);
        match (resource.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn object_api(&self, object: &ObjectRef) -> Api<DynamicObject> {
        self.dynamic_api(&object.resource, object.namespace.as_deref())
    }
}

fn api_resource(resource: &ResourceType) -> ApiResource {
    ApiResource {
        group: resource.group.clone(),
        version: resource.version.clone(),
        api_version: resource.api_version(),
        kind: resource.kind.clone(),
        plural: resource.resource.clone(),
    }
}

/// Split a discovery `groupVersion` into group and version; the core group has no slash
fn split_group_version(group_version: &str) -> (&str, &str) {
    match group_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", group_version),
    }
}

fn resource_types_from(list: APIResourceList) -> Vec<ResourceType> {
    let (group, version) = split_group_version(&list.group_version);
    list.resources
        .into_iter()
        .map(|r| ResourceType {
            group: r.group.unwrap_or_else(|| group.to_string()),
            version: r.version.unwrap_or_else(|| version.to_string()),
            resource: r.name,
            kind: r.kind,
            namespaced: r.namespaced,
            verbs: r.verbs.into_iter().collect(),
        })
        .collect()
}

fn namespace_snapshot(ns: Namespace) -> NamespaceSnapshot {
    let name = ns.metadata.name.unwrap_or_default();
    let finalizers = ns.metadata.finalizers.unwrap_or_default();
    let spec_finalizers = ns.spec.and_then(|s| s.finalizers).unwrap_or_default();
    let (phase, conditions) = match ns.status {
        Some(status) => (
            NamespacePhase::parse(status.phase.as_deref()),
            status
                .conditions
                .unwrap_or_default()
                .into_iter()
                .map(|c| NamespaceCondition {
                    type_: c.type_,
                    status: c.status,
                    reason: c.reason,
                    message: c.message,
                })
                .collect(),
        ),
        None => (NamespacePhase::Unknown, Vec::new()),
    };
    NamespaceSnapshot {
        name,
        phase,
        finalizers,
        spec_finalizers,
        conditions,
    }
}

fn webhook_services<'a>(configs: impl Iterator<Item = &'a WebhookClientConfig>) -> Vec<ServiceRef> {
    configs
        .filter_map(|c| c.service.as_ref())
        .map(|s| ServiceRef {
            namespace: s.namespace.clone(),
            name: s.name.clone(),
        })
        .collect()
}

fn view_from(obj: DynamicObject, resource: &ResourceType) -> Result<ResourceView, ClientError> {
    let mut view = ResourceView::try_from(serde_json::to_value(&obj)?)?;
    // list responses omit TypeMeta on items
    if view.api_version.is_empty() {
        view.api_version = resource.api_version();
    }
    if view.kind.is_empty() {
        view.kind = resource.kind.clone();
    }
    Ok(view)
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceSnapshot>, ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api
            .get_opt(name)
            .await
            .map_err(|e| ClientError::from_kube(e, format!("namespace {name}")))?;
        Ok(ns.map(namespace_snapshot))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClientError::from_kube(e, format!("namespace {name}")))?;
        Ok(())
    }

    async fn finalize_namespace(&self, name: &str) -> Result<(), ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let mut ns = api
            .get(name)
            .await
            .map_err(|e| ClientError::from_kube(e, format!("namespace {name}")))?;
        ns.metadata.finalizers = Some(Vec::new());
        if let Some(spec) = ns.spec.as_mut() {
            spec.finalizers = Some(Vec::new());
        }
        let body = serde_json::to_vec(&ns)?;
        api.replace_subresource("finalize", name, &PostParams::default(), body)
            .await
            .map_err(|e| ClientError::from_kube(e, format!("namespace {name}")))?;
        Ok(())
    }

    async fn discover_resource_types(&self) -> Result<Vec<ResourceType>, ClientError> {
        let mut types = Vec::new();

        let core_versions = self
            .client
            .list_core_api_versions()
            .await
            .map_err(|e| ClientError::from_kube(e, "core api versions"))?;
        for v in core_versions.versions {
            match self.client.list_core_api_resources(v.as_str()).await {
                Ok(list) => types.extend(resource_types_from(list)),
                Err(e) => warn!("Skipping core api {}: {}", v, e),
            }
        }

        let groups = self
            .client
            .list_api_groups()
            .await
            .map_err(|e| ClientError::from_kube(e, "api groups"))?;
        for group in groups.groups {
            let Some(gv) = group
                .preferred_version
                .or_else(|| group.versions.first().cloned())
            else {
                continue;
            };
            match self
                .client
                .list_api_group_resources(gv.group_version.as_str())
                .await
            {
                Ok(list) => types.extend(resource_types_from(list)),
                Err(e) => warn!("Skipping api group {}: {}", gv.group_version, e),
            }
        }

        debug!("Discovered {} resource types", types.len());
        Ok(types)
    }

    async fn list(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, ClientError> {
        let api = self.dynamic_api(resource, namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClientError::from_kube(e, resource.qualified_name()))?;
        list.items
            .into_iter()
            .map(|obj| view_from(obj, resource))
            .collect()
    }

    async fn get(&self, object: &ObjectRef) -> Result<ResourceView, ClientError> {
        let obj = self
            .object_api(object)
            .get(&object.name)
            .await
            .map_err(|e| ClientError::from_kube(e, object.to_string()))?;
        view_from(obj, &object.resource)
    }

    async fn patch_merge(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError> {
        self.object_api(object)
            .patch(&object.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClientError::from_kube(e, object.to_string()))?;
        Ok(())
    }

    async fn patch_json(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError> {
        let patch: json_patch::Patch = serde_json::from_value(patch)?;
        self.object_api(object)
            .patch(
                &object.name,
                &PatchParams::default(),
                &Patch::<()>::Json(patch),
            )
            .await
            .map_err(|e| ClientError::from_kube(e, object.to_string()))?;
        Ok(())
    }

    async fn replace(&self, object: &ObjectRef, view: &ResourceView) -> Result<(), ClientError> {
        let obj: DynamicObject = serde_json::from_value(view.to_value())?;
        self.object_api(object)
            .replace(&object.name, &PostParams::default(), &obj)
            .await
            .map_err(|e| ClientError::from_kube(e, object.to_string()))?;
        Ok(())
    }

    async fn delete(
        &self,
        object: &ObjectRef,
        grace_period: Option<u32>,
    ) -> Result<(), ClientError> {
        let dp = DeleteParams {
            grace_period_seconds: grace_period,
            ..Default::default()
        };
        self.object_api(object)
            .delete(&object.name, &dp)
            .await
            .map_err(|e| ClientError::from_kube(e, object.to_string()))?;
        Ok(())
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookConfiguration>, ClientError> {
        let mut configs = Vec::new();

        let validating: Api<ValidatingWebhookConfiguration> = Api::all(self.client.clone());
        let list = validating
            .list(&ListParams::default())
            .await
            .map_err(|e| ClientError::from_kube(e, "validatingwebhookconfigurations"))?;
        for item in list.items {
            let hooks = item.webhooks.unwrap_or_default();
            configs.push(WebhookConfiguration {
                kind: WebhookKind::Validating,
                name: item.metadata.name.unwrap_or_default(),
                services: webhook_services(hooks.iter().map(|w| &w.client_config)),
            });
        }

        let mutating: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        let list = mutating
            .list(&ListParams::default())
            .await
            .map_err(|e| ClientError::from_kube(e, "mutatingwebhookconfigurations"))?;
        for item in list.items {
            let hooks = item.webhooks.unwrap_or_default();
            configs.push(WebhookConfiguration {
                kind: WebhookKind::Mutating,
                name: item.metadata.name.unwrap_or_default(),
                services: webhook_services(hooks.iter().map(|w| &w.client_config)),
            });
        }

        Ok(configs)
    }

    async fn delete_webhook(&self, kind: WebhookKind, name: &str) -> Result<(), ClientError> {
        let dp = DeleteParams::default();
        let result = match kind {
            WebhookKind::Validating => {
                let api: Api<ValidatingWebhookConfiguration> = Api::all(self.client.clone());
                api.delete(name, &dp).await.map(|_| ())
            }
            WebhookKind::Mutating => {
                let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
                api.delete(name, &dp).await.map(|_| ())
            }
        };
        result.map_err(|e| ClientError::from_kube(e, format!("{kind} webhook {name}")))
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ClientError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let svc = api
            .get_opt(name)
            .await
            .map_err(|e| ClientError::from_kube(e, format!("service {namespace}/{name}")))?;
        Ok(svc.is_some())
    }
}
