//! `pod` command: force-delete named pods

use crate::engine::{PodBatchReport, force_delete_pods};
use crate::k8s::credentials::{self, CredentialInputs};
use crate::utils::NukeError;
use anyhow::Result;
use std::path::PathBuf;

/// Force-delete `names` in `namespace`. Fails only when nothing was removed.
pub async fn nuke_pods(
    names: &[String],
    namespace: &str,
    kubeconfig: Option<PathBuf>,
) -> Result<PodBatchReport> {
    let client = credentials::connect(&CredentialInputs::from_env(kubeconfig))
        .await
        .map_err(NukeError::from)?;

    match force_delete_pods(&client, namespace, names).await {
        Ok(report) => Ok(report),
        Err(e) if e.all_failed() => {
            Err(NukeError::pods_failed(namespace, &e.failed_names()).into())
        }
        Err(e) => {
            crate::log_warn!("{}", e);
            Ok(PodBatchReport {
                namespace: e.namespace,
                deleted: e.deleted,
                total: e.total,
            })
        }
    }
}
