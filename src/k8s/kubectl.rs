//! Kubectl wrapper used for direct raw API writes
//!
//! `kubectl replace --raw` sends the object straight to the resource path,
//! which is the last escalation when every client-side strategy failed.

use super::error::ClientError;
use super::types::ObjectRef;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Escalation path that rewrites an object through the raw REST endpoint
#[async_trait]
pub trait DirectApi: Send + Sync {
    async fn clear_finalizers(&self, object: &ObjectRef) -> Result<(), ClientError>;
}

/// REST path of a single object, e.g. `/apis/longhorn.io/v1beta2/namespaces/storage/volumes/pvc-1`
pub fn raw_path(object: &ObjectRef) -> String {
    let rt = &object.resource;
    let mut path = if rt.is_core() {
        format!("/api/{}", rt.version)
    } else {
        format!("/apis/{}/{}", rt.group, rt.version)
    };
    if let Some(ns) = &object.namespace {
        path.push_str(&format!("/namespaces/{ns}"));
    }
    path.push_str(&format!("/{}/{}", rt.resource, object.name));
    if rt.is_namespace() {
        path.push_str("/finalize");
    }
    path
}

/// Clear metadata finalizers (and spec finalizers for namespaces) on a raw object
pub fn without_finalizers(mut object: Value, namespace_kind: bool) -> Value {
    if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.insert("finalizers".to_string(), Value::Array(Vec::new()));
    }
    if namespace_kind && let Some(spec) = object.get_mut("spec").and_then(Value::as_object_mut) {
        spec.insert("finalizers".to_string(), Value::Array(Vec::new()));
    }
    object
}

fn command(program: &str, kubeconfig: Option<&Path>) -> Command {
    let mut cmd = Command::new(program);
    if let Some(kc) = kubeconfig {
        cmd.env("KUBECONFIG", kc);
    }
    cmd.kill_on_drop(true);
    cmd
}

/// Run kubectl and capture output
pub async fn run_kubectl_output(args: &[&str], kubeconfig: Option<&Path>) -> Result<String, ClientError> {
    run_output("kubectl", args, kubeconfig).await
}

async fn run_output(
    program: &str,
    args: &[&str],
    kubeconfig: Option<&Path>,
) -> Result<String, ClientError> {
    let mut cmd = command(program, kubeconfig);
    cmd.args(args);

    let output = cmd
        .output()
        .await
        .map_err(|e| ClientError::Other(format!("Failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ClientError::Other(format!(
            "{} command failed: {}\n{}",
            program,
            args.join(" "),
            stderr
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| ClientError::Other(e.to_string()))
}

/// Pipe a JSON body into `kubectl replace --raw <path> -f -`
pub async fn replace_raw(path: &str, body: &str, kubeconfig: Option<&Path>) -> Result<(), ClientError> {
    pipe_input("kubectl", &["replace", "--raw", path, "-f", "-"], body, kubeconfig).await
}

async fn pipe_input(
    program: &str,
    args: &[&str],
    body: &str,
    kubeconfig: Option<&Path>,
) -> Result<(), ClientError> {
    let mut cmd = command(program, kubeconfig);
    cmd.args(args);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ClientError::Other(format!("Failed to spawn {program}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(body.as_bytes())
            .await
            .map_err(|e| ClientError::Other(format!("Failed to write object to {program}: {e}")))?;
        // closing stdin ends the body
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ClientError::Other(format!("Failed to wait for {program}: {e}")))?;

    if !output.status.success() {
        return Err(ClientError::Other(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(())
}

/// [`DirectApi`] backed by the local kubectl binary
#[derive(Debug, Clone, Default)]
pub struct Kubectl {
    kubeconfig: Option<PathBuf>,
}

impl Kubectl {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self { kubeconfig }
    }

    pub fn available() -> bool {
        which::which("kubectl").is_ok()
    }
}

#[async_trait]
impl DirectApi for Kubectl {
    async fn clear_finalizers(&self, object: &ObjectRef) -> Result<(), ClientError> {
        let kubeconfig = self.kubeconfig.as_deref();
        let path = raw_path(object);
        // the finalize subresource is write-only; read the namespace itself
        let read_path = path.trim_end_matches("/finalize");

        let current = run_kubectl_output(&["get", "--raw", read_path], kubeconfig).await?;
        let current: Value = serde_json::from_str(&current)?;
        let body = without_finalizers(current, object.resource.is_namespace());

        replace_raw(&path, &body.to_string(), kubeconfig).await
    }
}
