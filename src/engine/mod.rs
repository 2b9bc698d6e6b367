//! Remediation engine
//!
//! Everything here talks to the cluster through [`crate::k8s::ClusterClient`],
//! so the whole engine runs against the in-memory fake in tests.

pub mod argocd;
pub mod conditions;
pub mod diagnostics;
pub mod discovery;
pub mod finalizer;
pub mod orchestrator;
pub mod pods;
pub mod providers;
pub mod report;
pub mod waiter;
pub mod webhooks;

pub use finalizer::{FinalizerStripper, PhaseCounts, RemediationOutcome, StripOutcome};
pub use orchestrator::Orchestrator;
pub use pods::{PodBatchReport, PodDeleteError, force_delete_pods};
pub use report::{RunReport, Verdict};
pub use webhooks::RemovalPolicy;
