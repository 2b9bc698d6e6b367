//! Known storage providers
//!
//! Storage operators leave finalizer-bearing custom resources behind that
//! generic discovery may miss (RBAC, aggregated APIs down), so each provider's
//! types are addressed explicitly.

use super::finalizer::{FinalizerStripper, PhaseCounts};
use crate::k8s::{ClientError, ClusterClient, ObjectRef, ResourceType, well_known};
use colored::Colorize;
use tracing::debug;

pub struct StorageProvider {
    pub name: &'static str,
    pub group: &'static str,
    /// Tried in order; the first version that lists wins for each resource
    pub versions: &'static [&'static str],
    /// `(plural, kind)` pairs
    pub resources: &'static [(&'static str, &'static str)],
    /// Substring identifying the provider's StorageClass provisioners
    pub provisioner: &'static str,
}

pub const LONGHORN: StorageProvider = StorageProvider {
    name: "Longhorn",
    group: "longhorn.io",
    versions: &["v1beta2", "v1beta1"],
    resources: &[
        ("volumes", "Volume"),
        ("replicas", "Replica"),
        ("engines", "Engine"),
        ("instancemanagers", "InstanceManager"),
        ("nodes", "Node"),
        ("volumeattachments", "VolumeAttachment"),
        ("snapshots", "Snapshot"),
    ],
    provisioner: "longhorn.io",
};

pub const ROOK_CEPH: StorageProvider = StorageProvider {
    name: "Rook-Ceph",
    group: "ceph.rook.io",
    versions: &["v1"],
    resources: &[
        ("cephclusters", "CephCluster"),
        ("cephblockpools", "CephBlockPool"),
        ("cephfilesystems", "CephFilesystem"),
        ("cephobjectstores", "CephObjectStore"),
        ("cephobjectstoreusers", "CephObjectStoreUser"),
    ],
    provisioner: "rook.io",
};

pub const OPENEBS: StorageProvider = StorageProvider {
    name: "OpenEBS",
    group: "openebs.io",
    versions: &["v1alpha1"],
    resources: &[
        ("blockdevices", "BlockDevice"),
        ("blockdeviceclaims", "BlockDeviceClaim"),
        ("cstorvolumes", "CStorVolume"),
        ("cstorvolumeclaims", "CStorVolumeClaim"),
        ("cstorvolumereplicas", "CStorVolumeReplica"),
    ],
    provisioner: "openebs.io",
};

pub const PROVIDERS: &[StorageProvider] = &[LONGHORN, ROOK_CEPH, OPENEBS];

/// Namespaces storage operators are commonly installed into
pub const STORAGE_NAMESPACES: &[&str] = &[
    "longhorn-system",
    "rook-ceph",
    "openebs",
    "portworx",
    "storageos",
];

/// Tokens in webhook configuration names that belong to storage operators
pub const STORAGE_WEBHOOK_TOKENS: &[&str] =
    &["longhorn", "rook-ceph", "openebs", "portworx", "storageos"];

impl StorageProvider {
    pub fn resource_type(&self, version: &str, plural: &str, kind: &str) -> ResourceType {
        ResourceType::new(self.group, version, plural, kind, true).with_verbs(&[
            "get", "list", "patch", "update", "delete",
        ])
    }
}

/// Strip and force-delete every instance of one provider's types in `namespace`
pub async fn sweep_provider(
    client: &dyn ClusterClient,
    stripper: &FinalizerStripper<'_>,
    provider: &StorageProvider,
    namespace: &str,
) -> PhaseCounts {
    let mut counts = PhaseCounts::default();

    for (plural, kind) in provider.resources {
        let mut listed = None;
        for version in provider.versions {
            let rt = provider.resource_type(version, plural, kind);
            match client.list(&rt, Some(namespace)).await {
                Ok(items) => {
                    listed = Some((rt, items));
                    break;
                }
                Err(e) => debug!("{} not listable: {}", rt, e),
            }
        }
        let Some((rt, items)) = listed else {
            continue;
        };
        if items.is_empty() {
            continue;
        }

        println!(
            "🔍 Found {} {} {} resources",
            items.len(),
            provider.name,
            plural
        );
        counts.found += items.len();

        for item in items {
            let object = ObjectRef::namespaced(rt.clone(), namespace, &item.name);
            let outcome = stripper.strip_and_delete(&object, Some(0)).await;
            if outcome.is_success() {
                println!("  {} {} {}: {}", "✓".green(), plural, item.name, outcome);
            } else {
                println!("  {} {} {}: {}", "✗".red(), plural, item.name, outcome);
            }
            counts.record(outcome);
        }
    }

    if counts.found > 0 {
        println!("📊 Processed {} {} resources", counts.processed, provider.name);
        println!(
            "💡 Tip: {} resources often have finalizers that prevent deletion",
            provider.name
        );
    }
    counts
}

/// Run every known provider's sweep in table order
pub async fn sweep_all(
    client: &dyn ClusterClient,
    stripper: &FinalizerStripper<'_>,
    namespace: &str,
) -> PhaseCounts {
    println!(
        "🔍 Checking for storage provider resources in namespace {}...",
        namespace
    );
    let mut total = PhaseCounts::default();
    for provider in PROVIDERS {
        total.merge(sweep_provider(client, stripper, provider, namespace).await);
    }
    total
}

/// StorageClasses provisioned by a known provider, as `(class, provider)`
pub async fn detect_storage_classes(
    client: &dyn ClusterClient,
) -> Result<Vec<(String, &'static str)>, ClientError> {
    let classes = client.list(&well_known::storage_classes(), None).await?;
    let mut found = Vec::new();
    for class in classes {
        let provisioner = class.str_field("/provisioner").unwrap_or_default();
        if let Some(provider) = PROVIDERS
            .iter()
            .find(|p| provisioner.contains(p.provisioner))
        {
            println!(
                "🔍 Detected {} storage class: {}",
                provider.name, class.name
            );
            println!(
                "💡 Tip: {} resources often have finalizers that prevent deletion",
                provider.name
            );
            found.push((class.name.clone(), provider.name));
        }
    }
    Ok(found)
}

/// Storage operator namespaces that are themselves stuck terminating
pub async fn detect_terminating_provider_namespaces(client: &dyn ClusterClient) -> Vec<String> {
    let mut terminating = Vec::new();
    for name in STORAGE_NAMESPACES {
        match client.get_namespace(name).await {
            Ok(Some(ns)) => {
                println!("🔍 Detected storage provider: {}", name);
                if ns.is_terminating() {
                    println!(
                        "{} Storage provider namespace {} is in Terminating state, which may cause PVC deletion issues",
                        "⚠️ ".yellow(),
                        name
                    );
                    println!("💡 Tip: You can disable storage provider webhooks with --bypass-webhooks flag");
                    terminating.push(name.to_string());
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Could not read namespace {}: {}", name, e),
        }
    }
    terminating
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::{FakeCluster, Op};
    use crate::k8s::{NamespacePhase, NamespaceSnapshot, ResourceView};
    use serde_json::json;

    fn longhorn_volume(version: &str, name: &str) -> (ResourceType, ResourceView) {
        let rt = LONGHORN.resource_type(version, "volumes", "Volume");
        let view = ResourceView::new(&rt.api_version(), "Volume", name, Some("storage"))
            .with_finalizers(&["longhorn.io"]);
        (rt, view)
    }

    #[tokio::test]
    async fn test_sweep_strips_and_force_deletes() {
        let (rt, view) = longhorn_volume("v1beta2", "pvc-1");
        let cluster = FakeCluster::new().with_object(&rt, view);
        let stripper = FinalizerStripper::new(&cluster);

        let counts = sweep_provider(&cluster, &stripper, &LONGHORN, "storage").await;
        assert_eq!(counts.found, 1);
        assert_eq!(counts.succeeded, 1);
        assert!(cluster.object(&rt, Some("storage"), "pvc-1").is_none());

        let deletes = cluster.calls_for(Op::Delete);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].grace, Some(0));
        let ops: Vec<Op> = cluster.mutations().into_iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![Op::PatchMerge, Op::Delete]);
    }

    #[tokio::test]
    async fn test_first_listable_version_wins() {
        let (v2, _) = longhorn_volume("v1beta2", "x");
        let (v1, view) = longhorn_volume("v1beta1", "old");
        let cluster = FakeCluster::new()
            .with_object(&v1, view)
            .failing(Op::List, &format!("{}/volumes", v2.api_version()));
        let stripper = FinalizerStripper::new(&cluster);

        let counts = sweep_provider(&cluster, &stripper, &LONGHORN, "storage").await;
        assert_eq!(counts.found, 1);
        assert_eq!(counts.succeeded, 1);
        assert!(cluster.object(&v1, Some("storage"), "old").is_none());

        let volume_lists = cluster
            .calls_for(Op::List)
            .into_iter()
            .filter(|c| c.target == "volumes.longhorn.io")
            .count();
        assert_eq!(volume_lists, 2, "v1beta2 refused, then v1beta1 listed");
        let patched = cluster.calls_for(Op::PatchMerge);
        assert_eq!(patched.len(), 1);
        assert!(patched[0].target.contains("old"));
    }

    #[tokio::test]
    async fn test_sweep_all_empty_namespace() {
        let cluster = FakeCluster::new();
        let stripper = FinalizerStripper::new(&cluster);
        let counts = sweep_all(&cluster, &stripper, "quiet").await;
        assert_eq!(counts, PhaseCounts::default());
        assert!(cluster.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_detect_storage_classes() {
        let sc = well_known::storage_classes();
        let class = |name: &str, provisioner: &str| {
            ResourceView::new("storage.k8s.io/v1", "StorageClass", name, None)
                .with_field("provisioner", json!(provisioner))
        };
        let cluster = FakeCluster::new()
            .with_object(&sc, class("longhorn", "driver.longhorn.io"))
            .with_object(&sc, class("ceph-block", "rook-ceph.rbd.csi.ceph.com"))
            .with_object(&sc, class("rook-fs", "rook.io/cephfs"))
            .with_object(&sc, class("standard", "kubernetes.io/gce-pd"));

        let found = detect_storage_classes(&cluster).await.unwrap();
        assert_eq!(
            found,
            vec![
                ("longhorn".to_string(), "Longhorn"),
                ("rook-fs".to_string(), "Rook-Ceph"),
            ]
        );
    }

    #[tokio::test]
    async fn test_terminating_provider_namespaces() {
        let cluster = FakeCluster::new()
            .with_namespace(NamespaceSnapshot::new("longhorn-system", NamespacePhase::Terminating))
            .with_namespace(NamespaceSnapshot::new("openebs", NamespacePhase::Active));
        let terminating = detect_terminating_provider_namespaces(&cluster).await;
        assert_eq!(terminating, vec!["longhorn-system".to_string()]);
    }
}
