//! In-memory cluster for tests
//!
//! Models just enough of the API server for the remediation engine: objects
//! with finalizers linger after delete until their finalizers are cleared, and
//! namespaces move to `Terminating` on delete and disappear once no finalizer
//! holds them (unless pinned as stuck).

use super::client::ClusterClient;
use super::error::ClientError;
use super::types::{
    NamespaceCondition, NamespacePhase, NamespaceSnapshot, ObjectRef, ResourceType, ResourceView, WebhookConfiguration,
    WebhookKind,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetNamespace,
    DeleteNamespace,
    FinalizeNamespace,
    Discover,
    List,
    Get,
    PatchMerge,
    PatchJson,
    Replace,
    Delete,
    ListWebhooks,
    DeleteWebhook,
    GetService,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::GetNamespace => "get_namespace",
            Op::DeleteNamespace => "delete_namespace",
            Op::FinalizeNamespace => "finalize_namespace",
            Op::Discover => "discover",
            Op::List => "list",
            Op::Get => "get",
            Op::PatchMerge => "patch_merge",
            Op::PatchJson => "patch_json",
            Op::Replace => "replace",
            Op::Delete => "delete",
            Op::ListWebhooks => "list_webhooks",
            Op::DeleteWebhook => "delete_webhook",
            Op::GetService => "get_service",
        };
        f.write_str(s)
    }
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub target: String,
    /// Grace period passed to deletes
    pub grace: Option<u32>,
}

type Key = (String, String, Option<String>, String);

fn key(resource: &ResourceType, namespace: Option<&str>, name: &str) -> Key {
    (
        resource.group.clone(),
        resource.resource.clone(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

#[derive(Debug, Clone)]
struct Stored {
    view: ResourceView,
    deleting: bool,
}

#[derive(Debug, Clone)]
struct FakeNamespace {
    snapshot: NamespaceSnapshot,
    stuck: bool,
}

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, FakeNamespace>,
    types: Vec<ResourceType>,
    objects: BTreeMap<Key, Stored>,
    webhooks: Vec<WebhookConfiguration>,
    services: BTreeSet<(String, String)>,
    failures: HashSet<(Op, String)>,
    condition_reads: BTreeMap<String, VecDeque<Vec<NamespaceCondition>>>,
    calls: Vec<Call>,
    next_version: u64,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn fails(&self, op: Op, target: &str) -> bool {
        self.failures.contains(&(op, target.to_string()))
    }

    fn record(&mut self, op: Op, target: impl Into<String>, grace: Option<u32>) {
        self.calls.push(Call {
            op,
            target: target.into(),
            grace,
        });
    }

    fn settle_namespace(&mut self, name: &str) {
        let remove = match self.namespaces.get(name) {
            Some(ns) => {
                ns.snapshot.phase == NamespacePhase::Terminating
                    && !ns.stuck
                    && ns.snapshot.all_finalizers().is_empty()
            }
            None => false,
        };
        if remove {
            self.namespaces.remove(name);
            self.objects
                .retain(|(_, _, ns, _), _| ns.as_deref() != Some(name));
        }
    }

    fn set_finalizers(&mut self, object: &ObjectRef, finalizers: Vec<String>) -> Result<(), ClientError> {
        if object.resource.is_namespace() {
            let ns = self
                .namespaces
                .get_mut(&object.name)
                .ok_or_else(|| ClientError::NotFound(object.to_string()))?;
            ns.snapshot.finalizers = finalizers;
            self.settle_namespace(&object.name);
            return Ok(());
        }

        let k = key(&object.resource, object.namespace.as_deref(), &object.name);
        let version = self.bump();
        let stored = self
            .objects
            .get_mut(&k)
            .ok_or_else(|| ClientError::NotFound(object.to_string()))?;
        stored.view.finalizers = finalizers;
        stored.view.resource_version = Some(version);
        if stored.deleting && stored.view.finalizers.is_empty() {
            self.objects.remove(&k);
        }
        Ok(())
    }

    fn view_of(&self, object: &ObjectRef) -> Option<ResourceView> {
        if object.resource.is_namespace() {
            return self.namespaces.get(&object.name).map(|ns| {
                ResourceView::new("v1", "Namespace", &object.name, None).with_finalizers(
                    &ns.snapshot
                        .finalizers
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>(),
                )
            });
        }
        self.objects
            .get(&key(
                &object.resource,
                object.namespace.as_deref(),
                &object.name,
            ))
            .map(|s| s.view.clone())
    }
}

fn injected(op: Op, target: &str) -> ClientError {
    ClientError::Api {
        code: 500,
        message: format!("injected {op} failure for {target}"),
    }
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_namespace(self, snapshot: NamespaceSnapshot) -> Self {
        self.lock().namespaces.insert(
            snapshot.name.clone(),
            FakeNamespace {
                snapshot,
                stuck: false,
            },
        );
        self
    }

    /// A namespace that never finishes terminating on its own
    pub fn with_stuck_namespace(self, snapshot: NamespaceSnapshot) -> Self {
        self.lock().namespaces.insert(
            snapshot.name.clone(),
            FakeNamespace {
                snapshot,
                stuck: true,
            },
        );
        self
    }

    /// Advertise a type through discovery
    pub fn with_type(self, resource: ResourceType) -> Self {
        self.lock().types.push(resource);
        self
    }

    pub fn with_object(self, resource: &ResourceType, mut view: ResourceView) -> Self {
        {
            let mut state = self.lock();
            let version = state.bump();
            view.resource_version = Some(version);
            let k = key(resource, view.namespace.as_deref(), &view.name);
            state.objects.insert(
                k,
                Stored {
                    view,
                    deleting: false,
                },
            );
        }
        self
    }

    pub fn with_webhook(self, webhook: WebhookConfiguration) -> Self {
        self.lock().webhooks.push(webhook);
        self
    }

    pub fn with_service(self, namespace: &str, name: &str) -> Self {
        self.lock()
            .services
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    /// Conditions a namespace reports on its next reads, one entry per read;
    /// the last one applied sticks
    pub fn with_condition_reads(self, namespace: &str, reads: Vec<Vec<NamespaceCondition>>) -> Self {
        self.lock()
            .condition_reads
            .insert(namespace.to_string(), reads.into());
        self
    }

    /// Make `op` fail for `target`: object or namespace name, or for lists the
    /// qualified type name (any version) or `group/version/resource`
    pub fn failing(self, op: Op, target: &str) -> Self {
        self.lock().failures.insert((op, target.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Ops that wrote to the cluster, in order
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c.op,
                    Op::DeleteNamespace
                        | Op::FinalizeNamespace
                        | Op::PatchMerge
                        | Op::PatchJson
                        | Op::Replace
                        | Op::Delete
                        | Op::DeleteWebhook
                )
            })
            .collect()
    }

    pub fn namespace_exists(&self, name: &str) -> bool {
        self.lock().namespaces.contains_key(name)
    }

    pub fn namespace(&self, name: &str) -> Option<NamespaceSnapshot> {
        self.lock().namespaces.get(name).map(|ns| ns.snapshot.clone())
    }

    pub fn object(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Option<ResourceView> {
        self.lock()
            .objects
            .get(&key(resource, namespace, name))
            .map(|s| s.view.clone())
    }

    pub fn webhook_names(&self) -> Vec<String> {
        self.lock().webhooks.iter().map(|w| w.name.clone()).collect()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceSnapshot>, ClientError> {
        let mut state = self.lock();
        state.record(Op::GetNamespace, name, None);
        if state.fails(Op::GetNamespace, name) {
            return Err(ClientError::Forbidden(format!("namespace {name}")));
        }
        let next = state
            .condition_reads
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        if let Some(conditions) = next
            && let Some(ns) = state.namespaces.get_mut(name)
        {
            ns.snapshot.conditions = conditions;
        }
        Ok(state.namespaces.get(name).map(|ns| ns.snapshot.clone()))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::DeleteNamespace, name, None);
        if state.fails(Op::DeleteNamespace, name) {
            return Err(injected(Op::DeleteNamespace, name));
        }
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(format!("namespace {name}")))?;
        ns.snapshot.phase = NamespacePhase::Terminating;
        state.settle_namespace(name);
        Ok(())
    }

    async fn finalize_namespace(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::FinalizeNamespace, name, None);
        if state.fails(Op::FinalizeNamespace, name) {
            return Err(injected(Op::FinalizeNamespace, name));
        }
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(format!("namespace {name}")))?;
        ns.snapshot.finalizers.clear();
        ns.snapshot.spec_finalizers.clear();
        state.settle_namespace(name);
        Ok(())
    }

    async fn discover_resource_types(&self) -> Result<Vec<ResourceType>, ClientError> {
        let mut state = self.lock();
        state.record(Op::Discover, "", None);
        if state.fails(Op::Discover, "") {
            return Err(injected(Op::Discover, "discovery"));
        }
        Ok(state.types.clone())
    }

    async fn list(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, ClientError> {
        let mut state = self.lock();
        let target = resource.qualified_name();
        let versioned = format!("{}/{}", resource.api_version(), resource.resource);
        state.record(Op::List, target.clone(), None);
        if state.fails(Op::List, &target) || state.fails(Op::List, &versioned) {
            return Err(ClientError::Forbidden(format!("list {versioned}")));
        }
        Ok(state
            .objects
            .iter()
            .filter(|((group, res, ns, _), _)| {
                *group == resource.group
                    && *res == resource.resource
                    && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, stored)| stored.view.clone())
            .collect())
    }

    async fn get(&self, object: &ObjectRef) -> Result<ResourceView, ClientError> {
        let mut state = self.lock();
        state.record(Op::Get, object.to_string(), None);
        if state.fails(Op::Get, &object.name) {
            return Err(injected(Op::Get, &object.name));
        }
        state
            .view_of(object)
            .ok_or_else(|| ClientError::NotFound(object.to_string()))
    }

    async fn patch_merge(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::PatchMerge, object.to_string(), None);
        if state.fails(Op::PatchMerge, &object.name) {
            return Err(injected(Op::PatchMerge, &object.name));
        }
        if state.view_of(object).is_none() {
            return Err(ClientError::NotFound(object.to_string()));
        }
        match patch.pointer("/metadata/finalizers") {
            Some(Value::Null) => state.set_finalizers(object, Vec::new()),
            Some(Value::Array(items)) => {
                let finalizers = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                state.set_finalizers(object, finalizers)
            }
            _ => Ok(()),
        }
    }

    async fn patch_json(&self, object: &ObjectRef, patch: Value) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::PatchJson, object.to_string(), None);
        if state.fails(Op::PatchJson, &object.name) {
            return Err(injected(Op::PatchJson, &object.name));
        }
        let Some(current) = state.view_of(object) else {
            return Err(ClientError::NotFound(object.to_string()));
        };
        let ops = patch.as_array().cloned().unwrap_or_default();
        for op in ops {
            let path = op.get("path").and_then(Value::as_str);
            let kind = op.get("op").and_then(Value::as_str);
            match (kind, path) {
                (Some("remove"), Some("/metadata/finalizers")) => {
                    if !current.has_finalizers() {
                        return Err(ClientError::Api {
                            code: 422,
                            message: "path /metadata/finalizers does not exist".to_string(),
                        });
                    }
                    state.set_finalizers(object, Vec::new())?;
                }
                _ => {
                    return Err(ClientError::Other(format!("unsupported json patch {op}")));
                }
            }
        }
        Ok(())
    }

    async fn replace(&self, object: &ObjectRef, view: &ResourceView) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::Replace, object.to_string(), None);
        if state.fails(Op::Replace, &object.name) {
            return Err(injected(Op::Replace, &object.name));
        }
        let Some(current) = state.view_of(object) else {
            return Err(ClientError::NotFound(object.to_string()));
        };
        if !object.resource.is_namespace()
            && view.resource_version.is_some()
            && view.resource_version != current.resource_version
        {
            return Err(ClientError::Conflict(object.to_string()));
        }
        state.set_finalizers(object, view.finalizers.clone())
    }

    async fn delete(
        &self,
        object: &ObjectRef,
        grace_period: Option<u32>,
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::Delete, object.to_string(), grace_period);
        if state.fails(Op::Delete, &object.name) {
            return Err(injected(Op::Delete, &object.name));
        }
        let k = key(&object.resource, object.namespace.as_deref(), &object.name);
        let Some(stored) = state.objects.get_mut(&k) else {
            return Err(ClientError::NotFound(object.to_string()));
        };
        if stored.view.has_finalizers() {
            stored.deleting = true;
        } else {
            state.objects.remove(&k);
        }
        Ok(())
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookConfiguration>, ClientError> {
        let mut state = self.lock();
        state.record(Op::ListWebhooks, "", None);
        if state.fails(Op::ListWebhooks, "") {
            return Err(ClientError::Forbidden("webhook configurations".to_string()));
        }
        Ok(state.webhooks.clone())
    }

    async fn delete_webhook(&self, kind: WebhookKind, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.record(Op::DeleteWebhook, format!("{kind} {name}"), None);
        if state.fails(Op::DeleteWebhook, name) {
            return Err(injected(Op::DeleteWebhook, name));
        }
        let before = state.webhooks.len();
        state.webhooks.retain(|w| !(w.kind == kind && w.name == name));
        if state.webhooks.len() == before {
            return Err(ClientError::NotFound(format!("{kind} webhook {name}")));
        }
        Ok(())
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ClientError> {
        let mut state = self.lock();
        state.record(Op::GetService, format!("{namespace}/{name}"), None);
        if state.fails(Op::GetService, name) {
            return Err(injected(Op::GetService, name));
        }
        Ok(state
            .services
            .contains(&(namespace.to_string(), name.to_string())))
    }
}
