//! ArgoCD Applications targeting the namespace
//!
//! An Application whose destination is the namespace keeps re-creating its
//! children, so it has to go first. Applications live in any namespace and are
//! matched on `spec.destination.namespace`.

use super::finalizer::{FinalizerStripper, PhaseCounts, RemediationOutcome, StripOutcome};
use super::waiter::{WaitOutcome, wait_for_object_gone};
use crate::config::PollSchedule;
use crate::k8s::{ClientError, ClusterClient, ObjectRef, ResourceType, ResourceView, well_known};
use colored::Colorize;
use std::fmt;

pub const GROUP: &str = "argoproj.io";
pub const VERSION: &str = "v1alpha1";

const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
const LABEL_NAME: &str = "app.kubernetes.io/name";
const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const ANNOTATION_INSTANCE: &str = "argocd.argoproj.io/instance";

pub fn application_type() -> ResourceType {
    ResourceType::new(GROUP, VERSION, "applications", "Application", true)
        .with_verbs(&["get", "list", "patch", "update", "delete"])
}

/// An Application whose destination is the target namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    /// Where the Application object itself lives (usually `argocd`)
    pub namespace: String,
}

impl Application {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::namespaced(application_type(), &self.namespace, &self.name)
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Applications deploying into `namespace`. A cluster without the Application
/// CRD has none.
pub async fn find_applications(
    client: &dyn ClusterClient,
    namespace: &str,
) -> Result<Vec<Application>, ClientError> {
    let apps = match client.list(&application_type(), None).await {
        Ok(apps) => apps,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(apps
        .into_iter()
        .filter(|app| app.str_field("/spec/destination/namespace") == Some(namespace))
        .filter_map(|app| {
            app.namespace.clone().map(|ns| Application {
                name: app.name.clone(),
                namespace: ns,
            })
        })
        .collect())
}

/// Whether an object carries ArgoCD's tracking labels or annotation
pub fn is_argocd_managed(view: &ResourceView) -> bool {
    let label = |key: &str| view.labels.get(key).map(String::as_str);

    label(LABEL_MANAGED_BY) == Some("argocd")
        || label(LABEL_PART_OF) == Some("argocd")
        || matches!(label(LABEL_NAME), Some("argocd") | Some("argocd-application"))
        || view.labels.contains_key(LABEL_INSTANCE)
        || view.annotations.contains_key(ANNOTATION_INSTANCE)
}

/// Delete one Application and wait for it; when it lingers past the schedule,
/// strip its finalizers and delete once more
pub async fn delete_application(
    client: &dyn ClusterClient,
    stripper: &FinalizerStripper<'_>,
    app: &Application,
    schedule: PollSchedule,
) -> RemediationOutcome {
    let object = app.object_ref();
    match client.delete(&object, None).await {
        Err(e) if e.is_not_found() => return RemediationOutcome::NotFound,
        Err(e) => {
            crate::log_warn!("Failed to delete ArgoCD Application {}: {}", app, e);
            return RemediationOutcome::DeleteFailed;
        }
        Ok(()) => {}
    }

    match wait_for_object_gone(client, &object, schedule).await {
        Ok(WaitOutcome::Gone) => RemediationOutcome::Deleted,
        Ok(WaitOutcome::StillPresent) | Err(_) => {
            println!(
                "⏳ ArgoCD Application {} still present after {:?}, removing finalizers",
                app,
                schedule.total()
            );
            stripper.strip_and_delete(&object, None).await
        }
    }
}

pub async fn delete_applications(
    client: &dyn ClusterClient,
    stripper: &FinalizerStripper<'_>,
    apps: &[Application],
    schedule: PollSchedule,
) -> PhaseCounts {
    let mut counts = PhaseCounts {
        found: apps.len(),
        ..Default::default()
    };
    for app in apps {
        println!("🔄 Deleting ArgoCD Application: {}", app);
        let outcome = delete_application(client, stripper, app, schedule).await;
        if outcome.is_success() {
            println!("{} ArgoCD Application {}: {}", "✓".green(), app, outcome);
        } else {
            println!("{} ArgoCD Application {}: {}", "✗".red(), app, outcome);
        }
        counts.record(outcome);
    }
    counts
}

/// Strip finalizers from ArgoCD-managed pods and PVCs in the namespace
pub async fn strip_managed_finalizers(
    client: &dyn ClusterClient,
    stripper: &FinalizerStripper<'_>,
    namespace: &str,
) -> PhaseCounts {
    let mut counts = PhaseCounts::default();

    for rt in [well_known::pods(), well_known::persistent_volume_claims()] {
        let items = match client.list(&rt, Some(namespace)).await {
            Ok(items) => items,
            Err(e) => {
                crate::log_warn!("Failed to list {} in {}: {}", rt, namespace, e);
                continue;
            }
        };
        for item in items
            .iter()
            .filter(|i| i.has_finalizers() && is_argocd_managed(i))
        {
            counts.found += 1;
            println!(
                "🔧 Removing finalizers from ArgoCD-managed {} {}",
                rt.kind, item.name
            );
            let object = ObjectRef::namespaced(rt.clone(), namespace, &item.name);
            let outcome = match stripper.strip(&object).await {
                Ok(StripOutcome::Gone) => RemediationOutcome::NotFound,
                Ok(_) => RemediationOutcome::FinalizersRemovedPendingDelete,
                Err(e) => {
                    crate::log_warn!("{}", e);
                    RemediationOutcome::FinalizerRemovalFailed
                }
            };
            counts.record(outcome);
        }
    }
    counts
}
