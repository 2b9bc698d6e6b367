//! Namespace diagnostics
//!
//! Read-only inspection of what is keeping a namespace around.

use super::argocd::is_argocd_managed;
use super::conditions::{ConditionFlags, classify};
use super::discovery::FinalizedInstance;
use crate::k8s::{ClientError, ClusterClient, NamespaceSnapshot, ResourceType, well_known};
use colored::Colorize;

/// Built-in types counted when looking for leftovers
fn counted_types() -> Vec<ResourceType> {
    vec![
        well_known::pods(),
        well_known::services(),
        well_known::persistent_volume_claims(),
        well_known::configmaps(),
        well_known::secrets(),
        well_known::deployments(),
        well_known::stateful_sets(),
        well_known::daemon_sets(),
    ]
}

#[derive(Debug, Clone)]
pub struct NamespaceDiagnosis {
    pub snapshot: NamespaceSnapshot,
    pub flags: ConditionFlags,
    /// `(resource, count)` for every counted type with instances left
    pub remaining: Vec<(String, usize)>,
    /// `(resource, error)` for counted types that could not be listed
    pub list_errors: Vec<(String, String)>,
    pub pvcs_with_finalizers: Vec<FinalizedInstance>,
    /// `"<kind> <name>"` of ArgoCD-managed pods, PVCs and services
    pub argocd_managed: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Diagnosis {
    /// The namespace disappeared before or during inspection
    Vanished,
    Present(Box<NamespaceDiagnosis>),
}

impl Diagnosis {
    pub fn is_vanished(&self) -> bool {
        matches!(self, Diagnosis::Vanished)
    }
}

pub async fn diagnose_namespace(
    client: &dyn ClusterClient,
    namespace: &str,
) -> Result<Diagnosis, ClientError> {
    let Some(snapshot) = client.get_namespace(namespace).await? else {
        return Ok(Diagnosis::Vanished);
    };

    let mut diagnosis = NamespaceDiagnosis {
        flags: classify(&snapshot.conditions),
        snapshot,
        remaining: Vec::new(),
        list_errors: Vec::new(),
        pvcs_with_finalizers: Vec::new(),
        argocd_managed: Vec::new(),
    };

    for rt in counted_types() {
        let items = match client.list(&rt, Some(namespace)).await {
            Ok(items) => items,
            Err(e) if e.is_not_found() => return Ok(Diagnosis::Vanished),
            Err(e) => {
                diagnosis.list_errors.push((rt.resource.clone(), e.to_string()));
                continue;
            }
        };
        if !items.is_empty() {
            diagnosis.remaining.push((rt.resource.clone(), items.len()));
        }

        let is_pvc = rt.kind == "PersistentVolumeClaim";
        let argocd_tracked = matches!(rt.kind.as_str(), "Pod" | "PersistentVolumeClaim" | "Service");
        for item in &items {
            if is_pvc && item.has_finalizers() {
                diagnosis.pvcs_with_finalizers.push(FinalizedInstance {
                    name: item.name.clone(),
                    finalizers: item.finalizers.clone(),
                });
            }
            if argocd_tracked && is_argocd_managed(item) {
                diagnosis
                    .argocd_managed
                    .push(format!("{} {}", rt.kind, item.name));
            }
        }
    }

    Ok(Diagnosis::Present(Box::new(diagnosis)))
}

pub fn print_diagnosis(namespace: &str, diagnosis: &Diagnosis) {
    let d = match diagnosis {
        Diagnosis::Vanished => {
            println!(
                "{} Namespace {} was deleted during diagnostics",
                "✓".green(),
                namespace
            );
            return;
        }
        Diagnosis::Present(d) => d,
    };

    println!("🔍 Diagnostics for namespace: {}", namespace.bold());
    println!("  Phase: {}", d.snapshot.phase);

    if !d.snapshot.conditions.is_empty() {
        println!("📊 Namespace Status Conditions:");
        for c in &d.snapshot.conditions {
            println!(
                "  - {}: {} (Reason: {})",
                c.type_,
                c.status,
                c.reason.as_deref().unwrap_or("-")
            );
            if let Some(message) = &c.message {
                println!("    Message: {}", message);
            }
        }
    }

    let finalizers = d.snapshot.all_finalizers();
    if !finalizers.is_empty() {
        println!("🔍 Namespace has finalizers: {}", finalizers.join(", "));
    }
    if d.flags.has_finalizers_remaining() {
        println!("  {} Namespace controller reports finalizers remaining", "•".yellow());
    }
    if d.flags.has_resources_remaining() {
        println!("  {} Namespace controller reports resources remaining", "•".yellow());
    }

    for (resource, count) in &d.remaining {
        println!(
            "{} Found {} {} resources still in namespace",
            "⚠️ ".yellow(),
            count,
            resource
        );
    }
    for (resource, error) in &d.list_errors {
        println!("{} Error listing {}: {}", "⚠️ ".yellow(), resource, error);
    }
    for pvc in &d.pvcs_with_finalizers {
        println!(
            "{} PVC {} has finalizers: {}",
            "⚠️ ".yellow(),
            pvc.name,
            pvc.finalizers.join(", ")
        );
    }

    if !d.argocd_managed.is_empty() {
        for managed in &d.argocd_managed {
            println!("🔍 Detected {} managed by ArgoCD", managed);
        }
        println!("ℹ️  This namespace contains resources managed by ArgoCD");
        println!(
            "💡 Tip: Check if the ArgoCD application was properly deleted with: kubectl get applications -A"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::{FakeCluster, Op};
    use crate::k8s::{NamespaceCondition, NamespacePhase, ResourceView};

    fn stuck_namespace() -> NamespaceSnapshot {
        let mut ns = NamespaceSnapshot::new("shop", NamespacePhase::Terminating);
        ns.spec_finalizers = vec!["kubernetes".into()];
        ns.conditions.push(NamespaceCondition {
            type_: "NamespaceFinalizersRemaining".into(),
            status: "True".into(),
            reason: Some("SomeFinalizersRemain".into()),
            message: Some("Some content in the namespace has finalizers remaining: kubernetes.io/pvc-protection in 1 resource instances".into()),
        });
        ns
    }

    #[tokio::test]
    async fn test_diagnose_counts_leftovers() {
        let pods = well_known::pods();
        let pvcs = well_known::persistent_volume_claims();
        let cluster = FakeCluster::new()
            .with_stuck_namespace(stuck_namespace())
            .with_object(&pods, ResourceView::new("v1", "Pod", "a", Some("shop")))
            .with_object(
                &pods,
                ResourceView::new("v1", "Pod", "b", Some("shop"))
                    .with_label("app.kubernetes.io/instance", "shop"),
            )
            .with_object(
                &pvcs,
                ResourceView::new("v1", "PersistentVolumeClaim", "data", Some("shop"))
                    .with_finalizers(&["kubernetes.io/pvc-protection"]),
            )
            .failing(Op::List, "secrets");

        let diagnosis = diagnose_namespace(&cluster, "shop").await.unwrap();
        let Diagnosis::Present(d) = &diagnosis else {
            panic!("namespace should be present");
        };
        assert!(d.flags.has_finalizers_remaining());
        assert!(d.remaining.contains(&("pods".to_string(), 2)));
        assert!(d.remaining.contains(&("persistentvolumeclaims".to_string(), 1)));
        assert_eq!(d.list_errors.len(), 1);
        assert_eq!(d.pvcs_with_finalizers[0].name, "data");
        assert_eq!(d.argocd_managed, vec!["Pod b".to_string()]);
        print_diagnosis("shop", &diagnosis);
        assert!(cluster.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_namespace() {
        let cluster = FakeCluster::new();
        let diagnosis = diagnose_namespace(&cluster, "gone").await.unwrap();
        assert!(diagnosis.is_vanished());
    }
}
