//! Finalizer Stripper
//!
//! Removes `metadata.finalizers` from one object through an ordered chain of
//! write strategies. Every step is verified with a fresh read, so a write that
//! the API server accepted but did not apply (admission mutation, a controller
//! re-adding its token) moves on to the next step.

use crate::k8s::{ClientError, ClusterClient, DirectApi, ObjectRef};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// One strategy in the removal chain, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripStep {
    MergePatch,
    JsonPatch,
    Update,
    /// Namespace `finalize` subresource
    Finalize,
    /// Raw REST replace through kubectl
    DirectApi,
}

impl fmt::Display for StripStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StripStep::MergePatch => "merge patch",
            StripStep::JsonPatch => "json patch",
            StripStep::Update => "update",
            StripStep::Finalize => "finalize subresource",
            StripStep::DirectApi => "direct api",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripOutcome {
    Removed { step: StripStep },
    /// The fresh read showed no finalizers; nothing was written
    NoFinalizers,
    /// The object no longer exists
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: StripStep,
    pub reason: String,
}

fn describe_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.step, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum FinalizerError {
    #[error("failed to read {object}: {source}")]
    Read {
        object: String,
        #[source]
        source: ClientError,
    },

    #[error("could not remove finalizers from {object} ({})", describe_failures(.failures))]
    Exhausted {
        object: String,
        failures: Vec<StepFailure>,
    },
}

/// Result of remediating one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationOutcome {
    Deleted,
    FinalizersRemovedThenDeleted,
    /// Finalizers are gone but the delete call itself failed
    FinalizersRemovedPendingDelete,
    NotFound,
    DeleteFailed,
    FinalizerRemovalFailed,
}

impl RemediationOutcome {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            RemediationOutcome::Deleted
                | RemediationOutcome::FinalizersRemovedThenDeleted
                | RemediationOutcome::FinalizersRemovedPendingDelete
                | RemediationOutcome::NotFound
        )
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemediationOutcome::Deleted => "deleted",
            RemediationOutcome::FinalizersRemovedThenDeleted => "finalizers removed, deleted",
            RemediationOutcome::FinalizersRemovedPendingDelete => {
                "finalizers removed, delete pending"
            }
            RemediationOutcome::NotFound => "already gone",
            RemediationOutcome::DeleteFailed => "delete failed",
            RemediationOutcome::FinalizerRemovalFailed => "finalizer removal failed",
        };
        f.write_str(s)
    }
}

/// Found/processed/succeeded counters for one phase of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub found: usize,
    pub processed: usize,
    pub succeeded: usize,
}

impl PhaseCounts {
    pub fn record(&mut self, outcome: RemediationOutcome) {
        self.processed += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        }
    }

    pub fn merge(&mut self, other: PhaseCounts) {
        self.found += other.found;
        self.processed += other.processed;
        self.succeeded += other.succeeded;
    }

    pub fn failed(&self) -> usize {
        self.processed - self.succeeded
    }
}

impl fmt::Display for PhaseCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found {}, processed {}, succeeded {}",
            self.found, self.processed, self.succeeded
        )
    }
}

pub struct FinalizerStripper<'a> {
    client: &'a dyn ClusterClient,
    direct: Option<&'a dyn DirectApi>,
}

impl<'a> FinalizerStripper<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self {
            client,
            direct: None,
        }
    }

    /// Enable the raw API escalation as the last step
    pub fn with_direct(mut self, direct: Option<&'a dyn DirectApi>) -> Self {
        self.direct = direct;
        self
    }

    /// Current finalizers, `None` when the object is gone.
    /// Namespaces report metadata and spec finalizers together.
    async fn current_finalizers(&self, object: &ObjectRef) -> Result<Option<Vec<String>>, ClientError> {
        if object.resource.is_namespace() {
            return Ok(self
                .client
                .get_namespace(&object.name)
                .await?
                .map(|ns| ns.all_finalizers()));
        }
        match self.client.get(object).await {
            Ok(view) => Ok(Some(view.finalizers)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn steps(&self, object: &ObjectRef) -> Vec<StripStep> {
        let mut steps = vec![StripStep::MergePatch, StripStep::JsonPatch, StripStep::Update];
        if object.resource.is_namespace() {
            steps.push(StripStep::Finalize);
        }
        if self.direct.is_some() {
            steps.push(StripStep::DirectApi);
        }
        steps
    }

    async fn apply(&self, step: StripStep, object: &ObjectRef) -> Result<(), ClientError> {
        match step {
            StripStep::MergePatch => {
                self.client
                    .patch_merge(object, json!({ "metadata": { "finalizers": null } }))
                    .await
            }
            StripStep::JsonPatch => {
                self.client
                    .patch_json(
                        object,
                        json!([{ "op": "remove", "path": "/metadata/finalizers" }]),
                    )
                    .await
            }
            StripStep::Update => {
                let mut view = self.client.get(object).await?;
                view.finalizers.clear();
                self.client.replace(object, &view).await
            }
            StripStep::Finalize => self.client.finalize_namespace(&object.name).await,
            StripStep::DirectApi => match self.direct {
                Some(direct) => direct.clear_finalizers(object).await,
                None => Err(ClientError::Other("direct api not enabled".to_string())),
            },
        }
    }

    pub async fn strip(&self, object: &ObjectRef) -> Result<StripOutcome, FinalizerError> {
        let finalizers = match self.current_finalizers(object).await {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(StripOutcome::Gone),
            Err(source) => {
                return Err(FinalizerError::Read {
                    object: object.to_string(),
                    source,
                });
            }
        };
        if finalizers.is_empty() {
            return Ok(StripOutcome::NoFinalizers);
        }
        debug!("Removing finalizers {:?} from {}", finalizers, object);

        let mut failures = Vec::new();
        for step in self.steps(object) {
            match self.apply(step, object).await {
                Err(e) if e.is_not_found() => return Ok(StripOutcome::Gone),
                Err(e) => {
                    debug!("{} on {} failed: {}", step, object, e);
                    failures.push(StepFailure {
                        step,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Ok(()) => {}
            }

            match self.current_finalizers(object).await {
                Ok(None) => return Ok(StripOutcome::Removed { step }),
                Ok(Some(left)) if left.is_empty() => return Ok(StripOutcome::Removed { step }),
                Ok(Some(left)) => failures.push(StepFailure {
                    step,
                    reason: format!("finalizers still present: {}", left.join(", ")),
                }),
                Err(e) => failures.push(StepFailure {
                    step,
                    reason: format!("verification read failed: {e}"),
                }),
            }
        }

        Err(FinalizerError::Exhausted {
            object: object.to_string(),
            failures,
        })
    }

    /// Plain delete first; strip finalizers when the delete fails or leaves the
    /// object lingering on its finalizers, retrying the delete after a failure.
    pub async fn delete_with_fallback(
        &self,
        object: &ObjectRef,
        grace_period: Option<u32>,
    ) -> RemediationOutcome {
        match self.client.delete(object, grace_period).await {
            Err(e) if e.is_not_found() => RemediationOutcome::NotFound,
            Ok(()) => match self.client.get(object).await {
                Ok(view) if view.has_finalizers() => match self.strip(object).await {
                    Ok(StripOutcome::Removed { .. }) => {
                        RemediationOutcome::FinalizersRemovedThenDeleted
                    }
                    Ok(_) => RemediationOutcome::Deleted,
                    Err(e) => {
                        crate::log_warn!("{}", e);
                        RemediationOutcome::FinalizerRemovalFailed
                    }
                },
                _ => RemediationOutcome::Deleted,
            },
            Err(e) => {
                debug!("Delete of {} failed ({}), removing finalizers", object, e);
                let stripped = match self.strip(object).await {
                    Ok(StripOutcome::Gone) => return RemediationOutcome::NotFound,
                    Ok(outcome) => matches!(outcome, StripOutcome::Removed { .. }),
                    Err(e) => {
                        crate::log_warn!("{}", e);
                        return RemediationOutcome::FinalizerRemovalFailed;
                    }
                };
                self.finish_delete(object, grace_period, stripped).await
            }
        }
    }

    /// Strip first, then delete whatever the strip result was
    pub async fn strip_and_delete(
        &self,
        object: &ObjectRef,
        grace_period: Option<u32>,
    ) -> RemediationOutcome {
        let stripped = match self.strip(object).await {
            Ok(StripOutcome::Gone) => return RemediationOutcome::NotFound,
            Ok(outcome) => Some(matches!(outcome, StripOutcome::Removed { .. })),
            Err(e) => {
                crate::log_warn!("{}", e);
                None
            }
        };
        match stripped {
            Some(stripped) => self.finish_delete(object, grace_period, stripped).await,
            None => {
                if let Err(e) = self.client.delete(object, grace_period).await
                    && !e.is_not_found()
                {
                    debug!("Delete of {} failed: {}", object, e);
                }
                RemediationOutcome::FinalizerRemovalFailed
            }
        }
    }

    async fn finish_delete(
        &self,
        object: &ObjectRef,
        grace_period: Option<u32>,
        stripped: bool,
    ) -> RemediationOutcome {
        match (self.client.delete(object, grace_period).await, stripped) {
            (Ok(()), true) => RemediationOutcome::FinalizersRemovedThenDeleted,
            (Err(e), true) if e.is_not_found() => RemediationOutcome::FinalizersRemovedThenDeleted,
            (Err(e), true) => {
                debug!("Delete of {} failed after finalizer removal: {}", object, e);
                RemediationOutcome::FinalizersRemovedPendingDelete
            }
            (Ok(()), false) => RemediationOutcome::Deleted,
            (Err(e), false) if e.is_not_found() => RemediationOutcome::NotFound,
            (Err(e), false) => {
                crate::log_warn!("Failed to delete {}: {}", object, e);
                RemediationOutcome::DeleteFailed
            }
        }
    }
}
