//! Minimal structural views of cluster objects
//!
//! Arbitrary custom resources are never deserialized into full schemas. A
//! [`ResourceView`] exposes the handful of metadata fields the remediation
//! engine needs and carries the rest of the object as an opaque payload, so a
//! read-modify-write round trip never drops fields it does not understand.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A resource type advertised by API discovery (or a well-known one)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `volumes`
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: BTreeSet<String>,
}

impl ResourceType {
    pub fn new(group: &str, version: &str, resource: &str, kind: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: kind.to_string(),
            namespaced,
            verbs: BTreeSet::new(),
        }
    }

    pub fn with_verbs(mut self, verbs: &[&str]) -> Self {
        self.verbs = verbs.iter().map(|v| v.to_string()).collect();
        self
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.verbs.contains(verb)
    }

    /// Subresources are advertised as `parent/sub`
    pub fn is_subresource(&self) -> bool {
        self.resource.contains('/')
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    pub fn is_namespace(&self) -> bool {
        self.is_core() && self.resource == "namespaces"
    }

    /// `resource.group` form accepted by kubectl
    pub fn qualified_name(&self) -> String {
        if self.group.is_empty() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.group)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// Built-in resource types addressed explicitly rather than through discovery
pub mod well_known {
    use super::ResourceType;

    const ALL_VERBS: &[&str] = &[
        "create",
        "delete",
        "deletecollection",
        "get",
        "list",
        "patch",
        "update",
        "watch",
    ];

    pub fn namespaces() -> ResourceType {
        ResourceType::new("", "v1", "namespaces", "Namespace", false).with_verbs(ALL_VERBS)
    }

    pub fn pods() -> ResourceType {
        ResourceType::new("", "v1", "pods", "Pod", true).with_verbs(ALL_VERBS)
    }

    pub fn services() -> ResourceType {
        ResourceType::new("", "v1", "services", "Service", true).with_verbs(ALL_VERBS)
    }

    pub fn configmaps() -> ResourceType {
        ResourceType::new("", "v1", "configmaps", "ConfigMap", true).with_verbs(ALL_VERBS)
    }

    pub fn secrets() -> ResourceType {
        ResourceType::new("", "v1", "secrets", "Secret", true).with_verbs(ALL_VERBS)
    }

    pub fn persistent_volume_claims() -> ResourceType {
        ResourceType::new(
            "",
            "v1",
            "persistentvolumeclaims",
            "PersistentVolumeClaim",
            true,
        )
        .with_verbs(ALL_VERBS)
    }

    pub fn deployments() -> ResourceType {
        ResourceType::new("apps", "v1", "deployments", "Deployment", true).with_verbs(ALL_VERBS)
    }

    pub fn replica_sets() -> ResourceType {
        ResourceType::new("apps", "v1", "replicasets", "ReplicaSet", true).with_verbs(ALL_VERBS)
    }

    pub fn stateful_sets() -> ResourceType {
        ResourceType::new("apps", "v1", "statefulsets", "StatefulSet", true).with_verbs(ALL_VERBS)
    }

    pub fn daemon_sets() -> ResourceType {
        ResourceType::new("apps", "v1", "daemonsets", "DaemonSet", true).with_verbs(ALL_VERBS)
    }

    pub fn storage_classes() -> ResourceType {
        ResourceType::new("storage.k8s.io", "v1", "storageclasses", "StorageClass", false)
            .with_verbs(ALL_VERBS)
    }
}

/// Address of a single object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub resource: ResourceType,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn namespaced(resource: ResourceType, namespace: &str, name: &str) -> Self {
        Self {
            resource,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(resource: ResourceType, name: &str) -> Self {
        Self {
            resource,
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn namespace_object(name: &str) -> Self {
        Self::cluster(well_known::namespaces(), name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.resource, ns, self.name),
            None => write!(f, "{} {}", self.resource, self.name),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: EnvelopeMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeMetadata {
    #[serde(default)]
    name: String,
    namespace: Option<String>,
    finalizers: Option<Vec<String>>,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
    resource_version: Option<String>,
}

/// Structural view of any object: identity, finalizers, labels, annotations,
/// and the untouched remainder of the object
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub finalizers: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub resource_version: Option<String>,
    raw: Value,
}

impl ResourceView {
    /// Build a fresh view with an otherwise empty payload
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".into(), Value::String(name.to_string()));
        if let Some(ns) = namespace {
            metadata.insert("namespace".into(), Value::String(ns.to_string()));
        }
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            finalizers: Vec::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            resource_version: None,
            raw: json!({
                "apiVersion": api_version,
                "kind": kind,
                "metadata": Value::Object(metadata),
            }),
        }
    }

    pub fn with_finalizers(mut self, finalizers: &[&str]) -> Self {
        self.finalizers = finalizers.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Set a top-level field of the passthrough payload (e.g. `spec`)
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.raw {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn has_finalizers(&self) -> bool {
        !self.finalizers.is_empty()
    }

    /// Look up a field of the payload by JSON pointer, e.g. `/spec/destination/namespace`
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.raw.pointer(pointer)
    }

    pub fn str_field(&self, pointer: &str) -> Option<&str> {
        self.field(pointer).and_then(Value::as_str)
    }

    /// Serialize back to a full object, applying the view's metadata on top of the payload
    pub fn to_value(&self) -> Value {
        let mut value = self.raw.clone();
        if !value.is_object() {
            value = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut value {
            map.insert("apiVersion".into(), Value::String(self.api_version.clone()));
            map.insert("kind".into(), Value::String(self.kind.clone()));

            let metadata = map
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if !metadata.is_object() {
                *metadata = Value::Object(Map::new());
            }
            if let Value::Object(meta) = metadata {
                meta.insert("name".into(), Value::String(self.name.clone()));
                match &self.namespace {
                    Some(ns) => {
                        meta.insert("namespace".into(), Value::String(ns.clone()));
                    }
                    None => {
                        meta.remove("namespace");
                    }
                }
                meta.insert("finalizers".into(), json!(self.finalizers));
                if self.labels.is_empty() {
                    meta.remove("labels");
                } else {
                    meta.insert("labels".into(), json!(self.labels));
                }
                if self.annotations.is_empty() {
                    meta.remove("annotations");
                } else {
                    meta.insert("annotations".into(), json!(self.annotations));
                }
                if let Some(rv) = &self.resource_version {
                    meta.insert("resourceVersion".into(), Value::String(rv.clone()));
                }
            }
        }
        value
    }
}

impl TryFrom<Value> for ResourceView {
    type Error = serde_json::Error;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let envelope: Envelope = serde_json::from_value(raw.clone())?;
        let meta = envelope.metadata;
        Ok(Self {
            api_version: envelope.api_version,
            kind: envelope.kind,
            name: meta.name,
            namespace: meta.namespace,
            finalizers: meta.finalizers.unwrap_or_default(),
            labels: meta.labels.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
            resource_version: meta.resource_version,
            raw,
        })
    }
}

/// Namespace lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespacePhase {
    Active,
    Terminating,
    Unknown,
}

impl NamespacePhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Active") => NamespacePhase::Active,
            Some("Terminating") => NamespacePhase::Terminating,
            _ => NamespacePhase::Unknown,
        }
    }
}

impl fmt::Display for NamespacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NamespacePhase::Active => "Active",
            NamespacePhase::Terminating => "Terminating",
            NamespacePhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceCondition {
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Fresh read of a namespace; never cached between decision points
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub phase: NamespacePhase,
    /// `metadata.finalizers`
    pub finalizers: Vec<String>,
    /// `spec.finalizers` (e.g. `kubernetes`), cleared only through `finalize`
    pub spec_finalizers: Vec<String>,
    pub conditions: Vec<NamespaceCondition>,
}

impl NamespaceSnapshot {
    pub fn new(name: &str, phase: NamespacePhase) -> Self {
        Self {
            name: name.to_string(),
            phase,
            finalizers: Vec::new(),
            spec_finalizers: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.phase == NamespacePhase::Terminating
    }

    /// Every finalizer token still blocking removal, metadata first
    pub fn all_finalizers(&self) -> Vec<String> {
        self.finalizers
            .iter()
            .chain(self.spec_finalizers.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Validating,
    Mutating,
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookKind::Validating => f.write_str("validating"),
            WebhookKind::Mutating => f.write_str("mutating"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A validating or mutating webhook configuration, reduced to the services it calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfiguration {
    pub kind: WebhookKind,
    pub name: String,
    /// In-cluster services referenced by the configuration's webhooks, in order
    pub services: Vec<ServiceRef>,
}
