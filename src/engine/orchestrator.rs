//! Namespace Deletion Orchestrator
//!
//! One pass per invocation, in a fixed order:
//! inspect, ArgoCD detection, discovery, (diagnose-only exit), ArgoCD
//! handling, webhooks, cleanup, force sweep, namespace delete, stuck
//! handling with a single cleanup retry, convergence wait.
//!
//! Only the initial namespace read can abort a run. Every later failure is
//! logged, counted and stepped over.

use super::argocd::{self, Application};
use super::conditions::{ConditionFlags, classify};
use super::diagnostics;
use super::discovery::{self, DiscoveryResult, ProblematicResourceType, is_custom_sweepable, is_strippable};
use super::finalizer::{FinalizerStripper, PhaseCounts, RemediationOutcome, StripOutcome};
use super::providers;
use super::report::{self, RunReport, Verdict};
use super::waiter::wait_for_namespace_gone;
use super::webhooks::{self, RemovalPolicy};
use crate::config::{Mode, RunConfig};
use crate::k8s::{ClientError, ClusterClient, DirectApi, NamespaceSnapshot, ObjectRef, ResourceType, well_known};
use crate::utils::NukeError;
use anyhow::Result;
use colored::Colorize;
use std::time::Duration;
use tracing::debug;

pub const PHASE_APPLICATIONS: &str = "argocd applications";
pub const PHASE_CLEANUP: &str = "cleanup";
pub const PHASE_ARGOCD_MANAGED: &str = "argocd-managed";
pub const PHASE_PODS: &str = "pods";
pub const PHASE_CORE: &str = "core resources";
pub const PHASE_PROVIDERS: &str = "storage providers";
pub const PHASE_PVCS: &str = "pvcs";
pub const PHASE_STRIP_ALL: &str = "finalizers";
pub const PHASE_PURGE: &str = "custom resources";
pub const PHASE_NAMESPACE: &str = "namespace finalizers";

/// Whether discovered finalizer-bearing resources get cleaned up.
/// Standard mode waits for the namespace controller to name them as blockers.
pub fn should_cleanup(mode: Mode, flags: &ConditionFlags, discovery: &DiscoveryResult) -> bool {
    if discovery.is_empty() {
        return false;
    }
    match mode {
        Mode::Force => true,
        Mode::Standard => flags.any(),
    }
}

/// Types force mode deletes outright, in order
fn force_deleted_types() -> Vec<ResourceType> {
    vec![
        well_known::services(),
        well_known::deployments(),
        well_known::replica_sets(),
        well_known::configmaps(),
        well_known::secrets(),
    ]
}

async fn settle(pause: Duration) {
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
}

fn print_outcome(label: &str, outcome: RemediationOutcome) {
    if outcome.is_success() {
        println!("  {} {}: {}", "✓".green(), label, outcome);
    } else {
        println!("  {} {}: {}", "✗".red(), label, outcome);
    }
}

pub struct Orchestrator<'a> {
    client: &'a dyn ClusterClient,
    config: &'a RunConfig,
    direct: Option<&'a dyn DirectApi>,
    webhook_policy: RemovalPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a dyn ClusterClient, config: &'a RunConfig) -> Self {
        Self {
            client,
            config,
            direct: None,
            webhook_policy: RemovalPolicy::Auto,
        }
    }

    /// Raw API escalation for the finalizer stripper
    pub fn with_direct(mut self, direct: Option<&'a dyn DirectApi>) -> Self {
        self.direct = direct;
        self
    }

    pub fn with_webhook_policy(mut self, policy: RemovalPolicy) -> Self {
        self.webhook_policy = policy;
        self
    }

    fn stripper(&self) -> FinalizerStripper<'a> {
        FinalizerStripper::new(self.client).with_direct(self.direct)
    }

    pub async fn resolve(&self, namespace: &str) -> Result<RunReport> {
        let mode = self.config.mode;
        let mut report = RunReport::new(namespace, mode);

        let snapshot = match self.client.get_namespace(namespace).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                println!("{} Namespace {} not found", "✓".green(), namespace);
                report.verdict = Verdict::Deleted;
                report.already_absent = true;
                return Ok(report);
            }
            Err(ClientError::Forbidden(what)) => {
                return Err(NukeError::permission_denied(&format!(
                    "get namespace {}: {}",
                    namespace, what
                ))
                .into());
            }
            Err(e) => {
                return Err(NukeError::namespace_lookup_failed(namespace, &e.to_string()).into());
            }
        };
        println!(
            "📋 Namespace {} is in '{}' state.",
            namespace.bold(),
            snapshot.phase
        );
        let flags = classify(&snapshot.conditions);

        println!(
            "🔍 Checking for ArgoCD applications managing namespace: {}",
            namespace
        );
        let applications = match argocd::find_applications(self.client, namespace).await {
            Ok(apps) => apps,
            Err(e) => {
                crate::log_warn!("Failed to detect ArgoCD applications: {}", e);
                Vec::new()
            }
        };
        if applications.is_empty() {
            println!("ℹ️  No ArgoCD applications found managing this namespace");
        } else {
            println!(
                "🎯 Found {} ArgoCD application(s) managing this namespace:",
                applications.len()
            );
            for app in &applications {
                println!("  - {}", app);
            }
        }
        report.applications = applications.clone();

        println!("🔍 Scanning custom resources for finalizers...");
        let found = discovery::discover(self.client, namespace).await;
        report.problematic = found.problematic.clone();

        if self.config.diagnose_only {
            self.diagnose(namespace, &snapshot, &flags, &applications, &found)
                .await;
            report.verdict = Verdict::Diagnosed;
            return Ok(report);
        }

        let stripper = self.stripper();

        if !applications.is_empty() {
            println!("🔄 Handling ArgoCD applications before namespace deletion...");
            let counts = argocd::delete_applications(
                self.client,
                &stripper,
                &applications,
                self.config.timings.application_wait,
            )
            .await;
            report.record_phase(PHASE_APPLICATIONS, counts);
            println!("⏳ Waiting for ArgoCD to clean up resources...");
            settle(self.config.timings.application_settle).await;
        }

        if self.config.bypass_webhooks {
            self.bypass_webhooks(&mut report).await;
        }

        // ArgoCD and webhook handling may have changed what blocks the namespace
        let current_flags = match self.client.get_namespace(namespace).await {
            Ok(Some(current)) => classify(&current.conditions),
            Ok(None) => {
                println!("{} Namespace {} is gone", "✓".green(), namespace);
                report.verdict = Verdict::Deleted;
                return Ok(report);
            }
            Err(e) => {
                crate::log_warn!("Failed to re-read namespace {}: {}", namespace, e);
                flags
            }
        };

        if should_cleanup(mode, &current_flags, &found) {
            self.cleanup(&stripper, namespace, &found.problematic, &mut report)
                .await;
            report.cleanup_ran = true;
        } else if !found.is_empty() {
            println!(
                "ℹ️  {} resource(s) of {} type(s) still carry finalizers, but namespace conditions report no blockers; leaving them to their controllers (use --force to clean them up)",
                found.instance_count(),
                found.problematic.len()
            );
        }

        if mode.is_force() {
            println!(
                "{} Force mode: aggressively deleting the contents of namespace {}",
                "💥".red(),
                namespace
            );
            self.force_sweep(&stripper, namespace, &mut report).await;
        }

        if self.delete_namespace(&stripper, namespace, &mut report).await {
            report.verdict = Verdict::Deleted;
            return Ok(report);
        }

        let outcome = wait_for_namespace_gone(
            self.client,
            namespace,
            self.config.timings.convergence(mode),
            self.config.show_progress,
        )
        .await;
        report.verdict = if outcome.is_gone() {
            Verdict::Deleted
        } else {
            Verdict::StillPresent
        };
        Ok(report)
    }

    async fn diagnose(
        &self,
        namespace: &str,
        snapshot: &NamespaceSnapshot,
        flags: &ConditionFlags,
        applications: &[Application],
        found: &DiscoveryResult,
    ) {
        match diagnostics::diagnose_namespace(self.client, namespace).await {
            Ok(diagnosis) => diagnostics::print_diagnosis(namespace, &diagnosis),
            Err(e) => crate::log_warn!("Could not get namespace details: {}", e),
        }
        report::print_discovery_report(namespace, flags, &found.problematic);
        if self.config.mode.is_force() {
            report::print_action_plan(&self.plan_force_actions(
                namespace,
                snapshot,
                applications,
                found,
            ));
        }
    }

    /// What a force run would do, one line per action
    pub fn plan_force_actions(
        &self,
        namespace: &str,
        snapshot: &NamespaceSnapshot,
        applications: &[Application],
        found: &DiscoveryResult,
    ) -> Vec<String> {
        let timings = &self.config.timings;
        let mut actions = Vec::new();

        if !applications.is_empty() {
            let names: Vec<String> = applications.iter().map(|a| a.to_string()).collect();
            actions.push(format!(
                "Delete {} ArgoCD Application(s): {} (removing finalizers if still present after {:?})",
                applications.len(),
                names.join(", "),
                timings.application_wait.total()
            ));
            actions.push(format!(
                "Wait {:?} for ArgoCD to clean up resources",
                timings.application_settle
            ));
        }
        if self.config.bypass_webhooks {
            actions.push(
                "Remove admission webhooks whose service is missing or terminating, storage provider webhooks included"
                    .to_string(),
            );
        }
        for p in &found.problematic {
            let names: Vec<&str> = p.instances.iter().map(|i| i.name.as_str()).collect();
            actions.push(format!(
                "Delete {} {} instance(s), removing finalizers on failure: {}",
                p.instances.len(),
                p.resource.qualified_name(),
                names.join(", ")
            ));
        }
        actions.push(format!(
            "Remove finalizers from ArgoCD-managed pods and PVCs in {}",
            namespace
        ));
        actions.push(format!("Force delete all pods in {} (grace period 0)", namespace));
        actions.push(
            "Force delete all services, deployments, replicasets, configmaps and secrets (grace period 0)"
                .to_string(),
        );
        let provider_names: Vec<&str> = providers::PROVIDERS.iter().map(|p| p.name).collect();
        actions.push(format!(
            "Remove finalizers from and force delete {} resources",
            provider_names.join(", ")
        ));
        let direct = if self.direct.is_some() {
            " (direct API escalation enabled)"
        } else {
            ""
        };
        actions.push(format!(
            "Remove finalizers from and force delete all PersistentVolumeClaims{}",
            direct
        ));
        actions.push("Remove finalizers from every namespaced resource".to_string());
        actions.push("Force delete every remaining custom resource".to_string());
        if snapshot.is_terminating() {
            actions.push(format!(
                "Remove finalizers from namespace {} (already Terminating)",
                namespace
            ));
        } else {
            actions.push(format!(
                "Delete namespace {}, removing its finalizers if it stays Terminating",
                namespace
            ));
        }
        actions.push(format!(
            "Wait up to {:?} for namespace {} to disappear",
            timings.convergence(Mode::Force).total(),
            namespace
        ));
        actions
    }

    async fn bypass_webhooks(&self, report: &mut RunReport) {
        if let Err(e) = providers::detect_storage_classes(self.client).await {
            crate::log_warn!("Failed to list storage classes: {}", e);
        }
        providers::detect_terminating_provider_namespaces(self.client).await;

        match webhooks::detect(
            self.client,
            self.webhook_policy,
            &self.config.extra_webhook_name_patterns,
        )
        .await
        {
            Ok(summary) => report.webhooks = Some(summary),
            Err(e) => crate::log_warn!("Failed to check webhook configurations: {}", e),
        }
    }

    /// Delete every finalizer-bearing instance, stripping when the delete fails
    async fn cleanup(
        &self,
        stripper: &FinalizerStripper<'_>,
        namespace: &str,
        problematic: &[ProblematicResourceType],
        report: &mut RunReport,
    ) {
        println!(
            "🧹 Cleaning up {} resource type(s) with finalizers...",
            problematic.len()
        );
        let mut counts = PhaseCounts::default();
        for p in problematic {
            println!("🔧 Cleaning up {}", p.resource);
            for instance in &p.instances {
                counts.found += 1;
                let object = ObjectRef::namespaced(p.resource.clone(), namespace, &instance.name);
                let outcome = stripper.delete_with_fallback(&object, Some(0)).await;
                print_outcome(&instance.name, outcome);
                counts.record(outcome);
            }
        }
        println!(
            "📊 Cleanup summary: {}/{} resources cleaned up",
            counts.succeeded, counts.found
        );
        report.record_phase(PHASE_CLEANUP, counts);
        settle(self.config.timings.cleanup_settle).await;
    }

    /// List a type and delete every instance with a zero grace period
    async fn force_delete_all(&self, rt: &ResourceType, namespace: &str) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        let items = match self.client.list(rt, Some(namespace)).await {
            Ok(items) => items,
            Err(e) => {
                debug!("Could not list {} in {}: {}", rt, namespace, e);
                return counts;
            }
        };
        if items.is_empty() {
            return counts;
        }
        println!("🗑️  Deleting {} {}...", items.len(), rt.resource);
        counts.found = items.len();
        for item in items {
            let object = ObjectRef::namespaced(rt.clone(), namespace, &item.name);
            let outcome = match self.client.delete(&object, Some(0)).await {
                Ok(()) => RemediationOutcome::Deleted,
                Err(e) if e.is_not_found() => RemediationOutcome::NotFound,
                Err(e) => {
                    crate::log_warn!("Failed to delete {}: {}", object, e);
                    RemediationOutcome::DeleteFailed
                }
            };
            counts.record(outcome);
        }
        counts
    }

    async fn force_sweep(
        &self,
        stripper: &FinalizerStripper<'_>,
        namespace: &str,
        report: &mut RunReport,
    ) {
        let timings = &self.config.timings;

        println!("🔧 Removing finalizers from ArgoCD-managed resources...");
        let counts = argocd::strip_managed_finalizers(self.client, stripper, namespace).await;
        report.record_phase(PHASE_ARGOCD_MANAGED, counts);

        let pods = self.force_delete_all(&well_known::pods(), namespace).await;
        report.record_phase(PHASE_PODS, pods);
        if pods.found > 0 {
            settle(timings.pod_settle).await;
        }

        for rt in force_deleted_types() {
            let counts = self.force_delete_all(&rt, namespace).await;
            report.record_phase(PHASE_CORE, counts);
        }

        let providers = providers::sweep_all(self.client, stripper, namespace).await;
        report.record_phase(PHASE_PROVIDERS, providers);
        if providers.found > 0 {
            println!("⏳ Waiting for storage provider resources to be processed...");
            settle(timings.provider_settle).await;
        }

        report.record_phase(PHASE_PVCS, self.sweep_pvcs(stripper, namespace).await);

        report.record_phase(PHASE_STRIP_ALL, self.strip_everything(stripper, namespace).await);
        report.record_phase(PHASE_PURGE, self.purge_custom_resources(namespace).await);
    }

    /// Strip then force-delete every PVC, whatever the strip result
    async fn sweep_pvcs(&self, stripper: &FinalizerStripper<'_>, namespace: &str) -> PhaseCounts {
        let rt = well_known::persistent_volume_claims();
        let mut counts = PhaseCounts::default();
        let pvcs = match self.client.list(&rt, Some(namespace)).await {
            Ok(pvcs) => pvcs,
            Err(e) => {
                crate::log_warn!("Failed to list PVCs in {}: {}", namespace, e);
                return counts;
            }
        };
        if pvcs.is_empty() {
            return counts;
        }
        println!("🔧 Handling {} PVC(s) in {}...", pvcs.len(), namespace);
        counts.found = pvcs.len();
        for pvc in pvcs {
            let object = ObjectRef::namespaced(rt.clone(), namespace, &pvc.name);
            let outcome = stripper.strip_and_delete(&object, Some(0)).await;
            print_outcome(&format!("pvc {}", pvc.name), outcome);
            counts.record(outcome);
        }
        counts
    }

    /// Strip finalizers from every instance of every namespaced type, core included
    async fn strip_everything(&self, stripper: &FinalizerStripper<'_>, namespace: &str) -> PhaseCounts {
        println!(
            "💥 Removing finalizers from all resources in namespace {}...",
            namespace
        );
        let mut counts = PhaseCounts::default();
        for rt in discovery::types_matching(self.client, is_strippable).await {
            let Ok(items) = self.client.list(&rt, Some(namespace)).await else {
                continue;
            };
            for item in items.iter().filter(|i| i.has_finalizers()) {
                counts.found += 1;
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
        if counts.found > 0 {
            println!(
                "📊 Removed finalizers from {}/{} resources",
                counts.succeeded, counts.found
            );
        }
        counts
    }

    async fn purge_custom_resources(&self, namespace: &str) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        for rt in discovery::types_matching(self.client, is_custom_sweepable).await {
            counts.merge(self.force_delete_all(&rt, namespace).await);
        }
        counts
    }

    async fn strip_namespace(&self, stripper: &FinalizerStripper<'_>, namespace: &str, report: &mut RunReport) {
        let object = ObjectRef::namespace_object(namespace);
        let mut counts = PhaseCounts {
            found: 1,
            ..Default::default()
        };
        let outcome = match stripper.strip(&object).await {
            Ok(StripOutcome::Removed { step }) => {
                println!(
                    "🔧 Finalizers removed from namespace {} ({})",
                    namespace, step
                );
                RemediationOutcome::FinalizersRemovedPendingDelete
            }
            Ok(StripOutcome::NoFinalizers) => {
                // nothing written, so nothing to count as remediated
                println!("ℹ️  Namespace {} has no finalizers to remove", namespace);
                counts.processed += 1;
                report.record_phase(PHASE_NAMESPACE, counts);
                return;
            }
            Ok(StripOutcome::Gone) => RemediationOutcome::NotFound,
            Err(e) => {
                crate::log_warn!("{}", e);
                println!(
                    "{} Could not remove finalizers from namespace {}",
                    "⚠️ ".yellow(),
                    namespace
                );
                RemediationOutcome::FinalizerRemovalFailed
            }
        };
        counts.record(outcome);
        report.record_phase(PHASE_NAMESPACE, counts);
    }

    /// Delete the namespace and handle it getting stuck. Returns true once
    /// the namespace is confirmed gone.
    async fn delete_namespace(
        &self,
        stripper: &FinalizerStripper<'_>,
        namespace: &str,
        report: &mut RunReport,
    ) -> bool {
        let current = match self.client.get_namespace(namespace).await {
            Ok(None) => {
                println!(
                    "{} Namespace {} was deleted during execution",
                    "✓".green(),
                    namespace
                );
                return true;
            }
            Ok(Some(ns)) => Some(ns),
            Err(e) => {
                debug!("Re-reading namespace {} failed: {}", namespace, e);
                None
            }
        };

        let stuck = if current.as_ref().is_some_and(NamespaceSnapshot::is_terminating) {
            println!(
                "{} Namespace {} is already Terminating. Removing finalizers...",
                "⚠️ ".yellow(),
                namespace
            );
            true
        } else {
            match self.client.delete_namespace(namespace).await {
                Ok(()) => println!("📤 Delete request sent for namespace {}", namespace),
                Err(e) if e.is_not_found() => return true,
                Err(e) => crate::log_warn!("Failed to delete namespace {}: {}", namespace, e),
            }
            if wait_for_namespace_gone(
                self.client,
                namespace,
                self.config.timings.initial_delete_wait,
                false,
            )
            .await
            .is_gone()
            {
                return true;
            }
            match self.client.get_namespace(namespace).await {
                Ok(None) => return true,
                Ok(Some(ns)) => ns.is_terminating(),
                Err(_) => false,
            }
        };

        if stuck {
            println!(
                "{} Namespace {} is stuck in Terminating state",
                "⚠️ ".yellow(),
                namespace
            );
            self.strip_namespace(stripper, namespace, report).await;

            if report.cleanup_ran {
                let again = discovery::discover(self.client, namespace).await;
                if !again.is_empty() {
                    println!("🔁 Retrying cleanup once before the final finalizer removal...");
                    self.cleanup(stripper, namespace, &again.problematic, report)
                        .await;
                    self.strip_namespace(stripper, namespace, report).await;
                }
            }
        }
        false
    }
}
