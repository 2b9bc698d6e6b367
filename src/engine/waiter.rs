//! Convergence waiter
//!
//! Sleep-then-poll on a fixed interval with a bounded number of polls. No
//! watches: the tool runs when the cluster is degraded and watch streams are
//! the first thing to become unreliable.

use crate::config::PollSchedule;
use crate::k8s::{ClientError, ClusterClient, ObjectRef};
use crate::utils::WaitProgress;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Gone,
    StillPresent,
}

impl WaitOutcome {
    pub fn is_gone(self) -> bool {
        self == WaitOutcome::Gone
    }
}

/// Poll until the namespace read reports not-found, or the schedule runs out.
/// Read errors other than not-found count as "still present".
pub async fn wait_for_namespace_gone(
    client: &dyn ClusterClient,
    name: &str,
    schedule: PollSchedule,
    show_progress: bool,
) -> WaitOutcome {
    let label = format!("namespace {}", name);
    let progress = WaitProgress::new(&label, "deleted", show_progress);

    for attempt in 1..=schedule.polls {
        tokio::time::sleep(schedule.interval).await;
        match client.get_namespace(name).await {
            Ok(None) => {
                progress.finish_success(&format!("{} deleted", label));
                return WaitOutcome::Gone;
            }
            Ok(Some(_)) => progress.update(attempt, schedule.polls),
            Err(e) => debug!("Polling namespace {} failed: {}", name, e),
        }
    }

    progress.finish_error(&format!(
        "{} still exists after {:?}",
        label,
        schedule.total()
    ));
    WaitOutcome::StillPresent
}

/// Poll a single object until it is gone. A read error other than not-found
/// aborts the wait.
pub async fn wait_for_object_gone(
    client: &dyn ClusterClient,
    object: &ObjectRef,
    schedule: PollSchedule,
) -> Result<WaitOutcome, ClientError> {
    for _ in 0..schedule.polls {
        match client.get(object).await {
            Err(e) if e.is_not_found() => return Ok(WaitOutcome::Gone),
            Err(e) => return Err(e),
            Ok(_) => tokio::time::sleep(schedule.interval).await,
        }
    }
    match client.get(object).await {
        Err(e) if e.is_not_found() => Ok(WaitOutcome::Gone),
        Err(e) => Err(e),
        Ok(_) => Ok(WaitOutcome::StillPresent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::{FakeCluster, Op};
    use crate::k8s::{NamespacePhase, NamespaceSnapshot, ResourceView, well_known};
    use std::time::Duration;

    fn schedule(polls: u32) -> PollSchedule {
        PollSchedule::new(Duration::ZERO, polls)
    }

    #[tokio::test]
    async fn test_namespace_already_gone() {
        let cluster = FakeCluster::new();
        let outcome = wait_for_namespace_gone(&cluster, "ghost", schedule(15), false).await;
        assert_eq!(outcome, WaitOutcome::Gone);
        assert_eq!(cluster.calls_for(Op::GetNamespace).len(), 1);
    }

    #[tokio::test]
    async fn test_namespace_never_goes_away() {
        let cluster = FakeCluster::new().with_stuck_namespace(NamespaceSnapshot::new(
            "stuck",
            NamespacePhase::Terminating,
        ));
        let outcome = wait_for_namespace_gone(&cluster, "stuck", schedule(15), false).await;
        assert_eq!(outcome, WaitOutcome::StillPresent);
        assert_eq!(cluster.calls_for(Op::GetNamespace).len(), 15);
    }

    #[tokio::test]
    async fn test_read_errors_keep_polling() {
        let cluster = FakeCluster::new()
            .with_namespace(NamespaceSnapshot::new("flaky", NamespacePhase::Active))
            .failing(Op::GetNamespace, "flaky");
        let outcome = wait_for_namespace_gone(&cluster, "flaky", schedule(3), false).await;
        assert_eq!(outcome, WaitOutcome::StillPresent);
        assert_eq!(cluster.calls_for(Op::GetNamespace).len(), 3);
    }

    #[tokio::test]
    async fn test_object_wait() {
        let pods = well_known::pods();
        let cluster = FakeCluster::new().with_object(
            &pods,
            ResourceView::new("v1", "Pod", "web", Some("ns")).with_finalizers(&["hold"]),
        );
        let obj = ObjectRef::namespaced(pods.clone(), "ns", "web");

        let outcome = wait_for_object_gone(&cluster, &obj, schedule(2)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::StillPresent);

        let missing = ObjectRef::namespaced(pods, "ns", "gone");
        let outcome = wait_for_object_gone(&cluster, &missing, schedule(2))
            .await
            .unwrap();
        assert!(outcome.is_gone());
    }
}
