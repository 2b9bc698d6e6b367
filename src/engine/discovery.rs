//! Resource Discovery & Sweep
//!
//! Enumerates the namespaced types the API server serves and finds instances
//! that still carry finalizers in the target namespace.

use crate::k8s::{ClusterClient, ResourceType};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedInstance {
    pub name: String,
    pub finalizers: Vec<String>,
}

/// A type with at least one finalizer-bearing instance in the namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblematicResourceType {
    pub resource: ResourceType,
    /// Instances of the type in the namespace, with or without finalizers
    pub total: usize,
    pub instances: Vec<FinalizedInstance>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub problematic: Vec<ProblematicResourceType>,
    /// Types that were listed
    pub scanned: usize,
    /// Types whose list call failed, by qualified name
    pub failed_types: Vec<String>,
}

impl DiscoveryResult {
    pub fn is_empty(&self) -> bool {
        self.problematic.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.problematic.iter().map(|p| p.instances.len()).sum()
    }
}

fn namespaced_object_type(rt: &ResourceType) -> bool {
    rt.namespaced && !rt.is_subresource()
}

/// Custom resource types worth sweeping: namespaced, listable and deletable,
/// outside the built-in dotless groups (`""`, `apps`, `batch`, ...)
pub fn is_custom_sweepable(rt: &ResourceType) -> bool {
    namespaced_object_type(rt)
        && rt.group.contains('.')
        && rt.supports("list")
        && rt.supports("delete")
}

/// Any namespaced type whose finalizers can be rewritten, core types included
pub fn is_strippable(rt: &ResourceType) -> bool {
    namespaced_object_type(rt) && rt.supports("list") && (rt.supports("patch") || rt.supports("update"))
}

/// Every advertised type matching `filter`; an unavailable discovery endpoint
/// yields an empty list
pub async fn types_matching(
    client: &dyn ClusterClient,
    filter: fn(&ResourceType) -> bool,
) -> Vec<ResourceType> {
    match client.discover_resource_types().await {
        Ok(types) => types.into_iter().filter(|rt| filter(rt)).collect(),
        Err(e) => {
            crate::log_warn!("Could not discover API resources: {}", e);
            Vec::new()
        }
    }
}

/// Find custom resource types with finalizer-bearing instances in `namespace`
pub async fn discover(client: &dyn ClusterClient, namespace: &str) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    for rt in types_matching(client, is_custom_sweepable).await {
        let items = match client.list(&rt, Some(namespace)).await {
            Ok(items) => items,
            Err(e) => {
                debug!("Skipping {}: {}", rt, e);
                result.failed_types.push(rt.qualified_name());
                continue;
            }
        };
        result.scanned += 1;

        let instances: Vec<FinalizedInstance> = items
            .iter()
            .filter(|item| item.has_finalizers())
            .map(|item| FinalizedInstance {
                name: item.name.clone(),
                finalizers: item.finalizers.clone(),
            })
            .collect();

        if !instances.is_empty() {
            result.problematic.push(ProblematicResourceType {
                resource: rt,
                total: items.len(),
                instances,
            });
        }
    }

    if !result.failed_types.is_empty() {
        crate::log_warn!(
            "Could not list {} resource type(s): {}",
            result.failed_types.len(),
            result.failed_types.join(", ")
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::{FakeCluster, Op};
    use crate::k8s::{ResourceView, well_known};

    const VERBS: &[&str] = &["get", "list", "patch", "update", "delete"];

    fn crd(group: &str, resource: &str, kind: &str) -> ResourceType {
        ResourceType::new(group, "v1", resource, kind, true).with_verbs(VERBS)
    }

    fn instance(rt: &ResourceType, name: &str, finalizers: &[&str]) -> ResourceView {
        ResourceView::new(&rt.api_version(), &rt.kind, name, Some("apps"))
            .with_finalizers(finalizers)
    }

    #[test]
    fn test_custom_filter() {
        assert!(is_custom_sweepable(&crd("example.io", "widgets", "Widget")));
        assert!(!is_custom_sweepable(&well_known::pods()));
        assert!(!is_custom_sweepable(&well_known::deployments()));
        assert!(!is_custom_sweepable(&crd("example.io", "widgets/status", "Widget")));

        let cluster_scoped = ResourceType::new("example.io", "v1", "things", "Thing", false)
            .with_verbs(VERBS);
        assert!(!is_custom_sweepable(&cluster_scoped));

        let read_only = ResourceType::new("example.io", "v1", "reports", "Report", true)
            .with_verbs(&["get", "list"]);
        assert!(!is_custom_sweepable(&read_only));
    }

    #[test]
    fn test_strippable_includes_core() {
        assert!(is_strippable(&well_known::pods()));
        assert!(is_strippable(&crd("example.io", "widgets", "Widget")));
        assert!(!is_strippable(&well_known::namespaces()));
    }

    #[tokio::test]
    async fn test_discover_finds_finalized_instances() {
        let widgets = crd("example.io", "widgets", "Widget");
        let gadgets = crd("example.io", "gadgets", "Gadget");
        let cluster = FakeCluster::new()
            .with_type(widgets.clone())
            .with_type(gadgets.clone())
            .with_type(well_known::pods())
            .with_object(&widgets, instance(&widgets, "w1", &["example.io/cleanup"]))
            .with_object(&widgets, instance(&widgets, "w2", &[]))
            .with_object(&gadgets, instance(&gadgets, "g1", &[]));

        let result = discover(&cluster, "apps").await;
        assert_eq!(result.scanned, 2);
        assert_eq!(result.problematic.len(), 1);
        let p = &result.problematic[0];
        assert_eq!(p.resource.resource, "widgets");
        assert_eq!(p.total, 2);
        assert_eq!(p.instances[0].name, "w1");
        assert_eq!(p.instances[0].finalizers, vec!["example.io/cleanup"]);
        assert!(
            cluster
                .calls_for(Op::List)
                .iter()
                .all(|c| c.target != "pods"),
            "core types are not part of the custom sweep"
        );
    }

    #[tokio::test]
    async fn test_list_failures_do_not_abort() {
        let types: Vec<ResourceType> = (0..4)
            .map(|i| crd("example.io", &format!("kind{i}s"), &format!("Kind{i}")))
            .collect();

        let build = |failing: &[usize]| {
            let mut cluster = FakeCluster::new();
            for rt in &types {
                cluster = cluster
                    .with_type(rt.clone())
                    .with_object(rt, instance(rt, "x", &["hold"]));
            }
            for &i in failing {
                cluster = cluster.failing(Op::List, &types[i].qualified_name());
            }
            cluster
        };

        let all = discover(&build(&[]), "apps").await;
        assert_eq!(all.problematic.len(), 4);

        let partial = discover(&build(&[1, 3]), "apps").await;
        assert_eq!(partial.problematic.len(), 2);
        assert_eq!(partial.failed_types.len(), 2);
        assert!(partial.problematic.len() <= all.problematic.len());
    }

    #[tokio::test]
    async fn test_discovery_endpoint_failure_is_empty() {
        let cluster = FakeCluster::new().failing(Op::Discover, "");
        let result = discover(&cluster, "apps").await;
        assert!(result.is_empty());
        assert_eq!(result.scanned, 0);
    }
}
