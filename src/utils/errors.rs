//! Enhanced error types with actionable suggestions

use crate::k8s::{ClientError, CredentialsError};
use colored::Colorize;
use thiserror::Error;

/// Fatal error with suggestions shown to the operator
#[derive(Error, Debug)]
#[error("{message}")]
pub struct NukeError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub docs_link: Option<String>,
}

impl NukeError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            docs_link: None,
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a documentation link
    pub fn with_docs(mut self, link: impl Into<String>) -> Self {
        self.docs_link = Some(link.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        eprintln!("{} {}", "❌".red(), self.message.red().bold());

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }

        if let Some(docs) = &self.docs_link {
            eprintln!();
            eprintln!("{} {}", "Documentation:".cyan(), docs);
        }
    }

    // Common error patterns

    /// Kubeconfig not found error
    pub fn kubeconfig_not_found(path: &str) -> Self {
        Self::new(format!("Kubeconfig not found: {}", path))
            .suggest("Check the path passed to --kubeconfig")
            .suggest("Unset KUBECONFIG to fall back to ~/.kube/config")
            .suggest("Verify access with: kubectl cluster-info")
            .with_docs("https://kubernetes.io/docs/concepts/configuration/organize-cluster-access-kubeconfig/")
    }

    /// No credential source produced a usable configuration
    pub fn no_credentials(detail: &str) -> Self {
        Self::new(format!("No usable cluster credentials: {}", detail))
            .suggest("Pass --kubeconfig /path/to/config")
            .suggest("Set KUBECONFIG or create ~/.kube/config")
            .suggest("Inside a pod, mount a service account token")
    }

    /// Permission denied error
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify you have sufficient cluster permissions")
            .suggest("Check if you need cluster-admin role")
            .suggest("Inspect with: kubectl auth can-i delete namespaces")
            .with_docs("https://kubernetes.io/docs/reference/access-authn-authz/rbac/")
    }

    /// Initial namespace read failed for a reason other than not-found
    pub fn namespace_lookup_failed(namespace: &str, reason: &str) -> Self {
        Self::new(format!("Failed to get namespace {}: {}", namespace, reason))
            .suggest(format!("Check it manually: kubectl get ns {}", namespace))
            .suggest("Run with -vv for more details")
    }

    /// API server unreachable
    pub fn connection_failed(detail: &str) -> Self {
        Self::new(format!("Cannot reach the API server: {}", detail))
            .suggest("Check if the cluster is healthy")
            .suggest("Verify network connectivity and the current context")
            .suggest("Verify access with: kubectl cluster-info")
    }

    /// Every pod in a batch failed
    pub fn pods_failed(namespace: &str, names: &[String]) -> Self {
        Self::new(format!(
            "Failed to delete pods in {}: {}",
            namespace,
            names.join(", ")
        ))
        .suggest(format!("List pods with: kubectl get pods -n {}", namespace))
        .suggest("Check the namespace with -n/--namespace")
    }
}

impl From<CredentialsError> for NukeError {
    fn from(err: CredentialsError) -> Self {
        match &err {
            CredentialsError::KubeconfigNotFound(path) => NukeError::kubeconfig_not_found(path),
            CredentialsError::NoCredentials(detail) => NukeError::no_credentials(detail),
            _ => NukeError::new(err.to_string())
                .suggest("Check the kubeconfig file for syntax errors")
                .suggest("Verify access with: kubectl cluster-info"),
        }
    }
}

/// Helper to display error and exit
pub fn display_error_and_exit(error: NukeError) -> ! {
    error.display();
    std::process::exit(1);
}

/// Convert anyhow error to NukeError when possible
pub fn enhance_error(err: anyhow::Error) -> NukeError {
    let err = match err.downcast::<NukeError>() {
        Ok(nuke) => return nuke,
        Err(err) => err,
    };
    let err = match err.downcast::<CredentialsError>() {
        Ok(creds) => return creds.into(),
        Err(err) => err,
    };
    if let Some(ClientError::Forbidden(what)) = err.downcast_ref::<ClientError>() {
        return NukeError::permission_denied(what);
    }

    let err_str = format!("{:#}", err);
    let lower = err_str.to_lowercase();

    if lower.contains("connection refused")
        || lower.contains("timed out")
        || lower.contains("dns error")
    {
        return NukeError::connection_failed(&err_str);
    }

    if lower.contains("unauthorized") || lower.contains("forbidden") {
        return NukeError::permission_denied(&err_str);
    }

    // Default error with generic suggestion
    NukeError::new(err_str).suggest("Run with -vv for more details")
}
