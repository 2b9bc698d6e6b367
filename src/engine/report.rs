//! Run report, discovery report and the dry-run action plan

use super::argocd::Application;
use super::conditions::ConditionFlags;
use super::discovery::ProblematicResourceType;
use super::finalizer::PhaseCounts;
use super::webhooks::WebhookSummary;
use crate::config::Mode;
use colored::Colorize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The namespace is gone
    Deleted,
    /// Still there when the convergence wait ran out
    StillPresent,
    /// Diagnose-only run; nothing was changed
    Diagnosed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Deleted => f.write_str("deleted"),
            Verdict::StillPresent => f.write_str("still present"),
            Verdict::Diagnosed => f.write_str("diagnosed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub name: &'static str,
    pub counts: PhaseCounts,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub namespace: String,
    pub mode: Mode,
    pub verdict: Verdict,
    /// The namespace did not exist when the run started
    pub already_absent: bool,
    pub phases: Vec<PhaseSummary>,
    pub problematic: Vec<ProblematicResourceType>,
    pub applications: Vec<Application>,
    pub cleanup_ran: bool,
    pub webhooks: Option<WebhookSummary>,
}

impl RunReport {
    pub fn new(namespace: &str, mode: Mode) -> Self {
        Self {
            namespace: namespace.to_string(),
            mode,
            verdict: Verdict::StillPresent,
            already_absent: false,
            phases: Vec::new(),
            problematic: Vec::new(),
            applications: Vec::new(),
            cleanup_ran: false,
            webhooks: None,
        }
    }

    /// Add counts to a phase, creating it on first use
    pub fn record_phase(&mut self, name: &'static str, counts: PhaseCounts) {
        match self.phases.iter_mut().find(|p| p.name == name) {
            Some(phase) => phase.counts.merge(counts),
            None => self.phases.push(PhaseSummary { name, counts }),
        }
    }

    pub fn phase(&self, name: &str) -> Option<PhaseCounts> {
        self.phases.iter().find(|p| p.name == name).map(|p| p.counts)
    }

    /// Still present, but some remediation went through
    pub fn partially_cleaned(&self) -> bool {
        self.verdict == Verdict::StillPresent && self.phases.iter().any(|p| p.counts.succeeded > 0)
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", "📊 Run summary".bold());
        for phase in &self.phases {
            println!("  {:<22} {}", phase.name, phase.counts);
        }
        if let Some(w) = &self.webhooks {
            println!("  {:<22} found {}, removed {}", "webhooks", w.found, w.removed);
        }

        match self.verdict {
            Verdict::Deleted if self.already_absent => println!(
                "{} Namespace {} does not exist; nothing to do",
                "✓".green(),
                self.namespace
            ),
            Verdict::Deleted => println!(
                "{} Namespace {} deleted",
                "✓".green().bold(),
                self.namespace.bold()
            ),
            Verdict::StillPresent => {
                let label = if self.partially_cleaned() {
                    "still present (partially cleaned)"
                } else {
                    "still present"
                };
                println!(
                    "{} Namespace {} {}. Background controllers may still finish; check with: kubectl get ns {}",
                    "⚠️ ".yellow(),
                    self.namespace,
                    label,
                    self.namespace
                );
                if !self.mode.is_force() {
                    println!("💡 Re-run with --force to clean up everything in the namespace");
                }
            }
            Verdict::Diagnosed => println!("{}", "No changes were made (--dry-run mode)".yellow()),
        }
    }
}

/// Problematic types, condition analysis and copy-pasteable remediation commands
pub fn print_discovery_report(
    namespace: &str,
    flags: &ConditionFlags,
    problematic: &[ProblematicResourceType],
) {
    println!();
    println!("{} {}", "🔍 DISCOVERY RESULTS FOR NAMESPACE:".bold(), namespace);
    println!();
    println!("📊 Namespace condition analysis:");
    if let Some(message) = &flags.finalizers_message {
        println!("  {} Finalizers remaining: {}", "⚠️ ".yellow(), message);
    }
    if let Some(message) = &flags.resources_message {
        println!("  {} Resources remaining: {}", "⚠️ ".yellow(), message);
    }
    if !flags.any() {
        println!(
            "  {} No finalizer or resource issues reported in namespace conditions",
            "✓".green()
        );
    }

    println!();
    println!("🎯 Resource types with finalizers:");
    if problematic.is_empty() {
        println!(
            "  {} No custom resources with finalizers found in namespace {}",
            "✓".green(),
            namespace
        );
        return;
    }

    for (i, p) in problematic.iter().enumerate() {
        println!(
            "  {}. {} (group {}, version {})",
            i + 1,
            p.resource.resource,
            p.resource.group,
            p.resource.version
        );
        println!("     Kind: {}", p.resource.kind);
        println!(
            "     Instances: {} total, {} with finalizers",
            p.total,
            p.instances.len()
        );
        for instance in &p.instances {
            println!("       - {}: {}", instance.name, instance.finalizers.join(", "));
        }
    }

    println!();
    println!("{}", "💡 Recommendations:".bold());
    for line in recommendations(namespace, flags, problematic) {
        println!("{}", line);
    }
}

/// kubectl commands per problematic type, then the kubectl-nuke invocations that would help
pub fn recommendations(
    namespace: &str,
    flags: &ConditionFlags,
    problematic: &[ProblematicResourceType],
) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, p) in problematic.iter().enumerate() {
        let resource = p.resource.qualified_name();
        lines.push(format!("  {}. For {}:", i + 1, resource));
        lines.push("     a) Try to delete resources normally:".to_string());
        for instance in &p.instances {
            lines.push(format!(
                "        kubectl delete {} {} -n {}",
                resource, instance.name, namespace
            ));
        }
        lines.push("     b) If deletion fails, remove finalizers:".to_string());
        for instance in &p.instances {
            lines.push(format!(
                r#"        kubectl patch {} {} -n {} --type json -p '[{{"op":"remove","path":"/metadata/finalizers"}}]'"#,
                resource, instance.name, namespace
            ));
        }
    }

    lines.push(format!("  {}. Use kubectl-nuke:", problematic.len() + 1));
    if flags.any() {
        lines.push("     # Standard mode (cleans up resources the namespace controller reports)".to_string());
        lines.push(format!("     kubectl-nuke ns {}", namespace));
    }
    lines.push("     # Force mode (cleans up every resource with finalizers)".to_string());
    lines.push(format!("     kubectl-nuke ns {} --force", namespace));
    lines
}

/// Print the actions a force run would take, as a numbered list
pub fn print_action_plan(actions: &[String]) {
    println!();
    println!(
        "{}",
        "[DRY RUN] Would perform the following actions:".cyan().bold()
    );
    println!();
    for (i, action) in actions.iter().enumerate() {
        println!("  {}. {}", i + 1, action);
    }
    println!();
}
