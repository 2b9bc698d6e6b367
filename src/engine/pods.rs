//! Pod batch force-delete

use crate::k8s::{ClusterClient, ObjectRef, well_known};
use colored::Colorize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodBatchReport {
    pub namespace: String,
    pub deleted: Vec<String>,
    pub total: usize,
}

/// Some pods in the batch could not be deleted; only those are listed
#[derive(Error, Debug)]
#[error("failed to delete {} of {total} pod(s) in {namespace}: {}", .failed.len(), describe(.failed))]
pub struct PodDeleteError {
    pub namespace: String,
    /// `(pod, reason)`
    pub failed: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub total: usize,
}

fn describe(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(pod, reason)| format!("{pod} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PodDeleteError {
    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Nothing in the batch was removed
    pub fn all_failed(&self) -> bool {
        self.deleted.is_empty()
    }
}

/// Confirm each pod exists, then delete it with a zero grace period
pub async fn force_delete_pods(
    client: &dyn ClusterClient,
    namespace: &str,
    names: &[String],
) -> Result<PodBatchReport, PodDeleteError> {
    let pods = well_known::pods();
    let mut deleted = Vec::new();
    let mut failed = Vec::new();

    for name in names {
        println!("🚀 Force deleting pod: {}", name);
        let object = ObjectRef::namespaced(pods.clone(), namespace, name);

        if let Err(e) = client.get(&object).await {
            if e.is_not_found() {
                println!("{} Pod {} not found in namespace {}", "⚠️ ".yellow(), name, namespace);
                failed.push((name.clone(), "not found".to_string()));
            } else {
                println!("{} Could not read pod {}: {}", "⚠️ ".yellow(), name, e);
                failed.push((name.clone(), e.to_string()));
            }
            continue;
        }

        match client.delete(&object, Some(0)).await {
            Ok(()) => {
                println!("{} Force delete request sent for pod: {}", "✓".green(), name);
                deleted.push(name.clone());
            }
            Err(e) => {
                println!("{} Failed to delete pod {}: {}", "✗".red(), name, e);
                failed.push((name.clone(), e.to_string()));
            }
        }
    }

    println!(
        "📊 Summary: {}/{} pods processed successfully",
        deleted.len(),
        names.len()
    );

    if failed.is_empty() {
        Ok(PodBatchReport {
            namespace: namespace.to_string(),
            deleted,
            total: names.len(),
        })
    } else {
        Err(PodDeleteError {
            namespace: namespace.to_string(),
            failed,
            deleted,
            total: names.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::ResourceView;
    use crate::k8s::fake::{FakeCluster, Op};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_lists_only_missing() {
        let pods = well_known::pods();
        let cluster = FakeCluster::new()
            .with_object(&pods, ResourceView::new("v1", "Pod", "pod1", Some("ns")))
            .with_object(&pods, ResourceView::new("v1", "Pod", "pod2", Some("ns")));

        let err = force_delete_pods(&cluster, "ns", &names(&["pod1", "pod2", "missing-pod"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed_names(), vec!["missing-pod".to_string()]);
        assert_eq!(err.deleted, names(&["pod1", "pod2"]));
        assert!(!err.all_failed());
        assert!(err.to_string().contains("missing-pod"));
        assert!(!err.to_string().contains("pod1"));
        assert!(cluster.object(&pods, Some("ns"), "pod1").is_none());
        assert!(cluster.object(&pods, Some("ns"), "pod2").is_none());

        let deletes = cluster.calls_for(Op::Delete);
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().all(|c| c.grace == Some(0)));
    }

    #[tokio::test]
    async fn test_all_deleted() {
        let pods = well_known::pods();
        let cluster = FakeCluster::new()
            .with_object(&pods, ResourceView::new("v1", "Pod", "web", Some("ns")));
        let report = force_delete_pods(&cluster, "ns", &names(&["web"])).await.unwrap();
        assert_eq!(report.deleted, names(&["web"]));
        assert_eq!(report.total, 1);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let cluster = FakeCluster::new();
        let err = force_delete_pods(&cluster, "ns", &names(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(err.all_failed());
        assert_eq!(err.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_its_reason() {
        let pods = well_known::pods();
        let cluster = FakeCluster::new()
            .with_object(&pods, ResourceView::new("v1", "Pod", "locked", Some("ns")))
            .failing(Op::Get, "locked");
        let err = force_delete_pods(&cluster, "ns", &names(&["locked", "ghost"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed[0].0, "locked");
        assert!(!err.failed[0].1.contains("not found"));
        assert!(err.failed[0].1.contains("injected get failure"));
        assert_eq!(err.failed[1], ("ghost".to_string(), "not found".to_string()));
        assert!(cluster.object(&pods, Some("ns"), "locked").is_some());
    }
}
