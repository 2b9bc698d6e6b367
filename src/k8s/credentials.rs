//! Ordered credential resolution
//!
//! Each [`CredentialSource`] is tried in turn and reports a tagged
//! [`ResolutionAttempt`]; the first `Resolved` wins.

use super::client::KubeClusterClient;
use super::error::CredentialsError;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where credentials may come from, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `--kubeconfig` flag
    ExplicitPath,
    /// `$KUBECONFIG`, possibly a list of files
    EnvKubeconfig,
    /// Service account mounted into a pod
    InCluster,
    /// `$HOME/.kube/config`
    HomeKubeconfig,
}

impl CredentialSource {
    pub const ORDER: [CredentialSource; 4] = [
        CredentialSource::ExplicitPath,
        CredentialSource::EnvKubeconfig,
        CredentialSource::InCluster,
        CredentialSource::HomeKubeconfig,
    ];
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialSource::ExplicitPath => "--kubeconfig",
            CredentialSource::EnvKubeconfig => "$KUBECONFIG",
            CredentialSource::InCluster => "in-cluster service account",
            CredentialSource::HomeKubeconfig => "~/.kube/config",
        };
        f.write_str(s)
    }
}

/// Outcome of trying one source
#[derive(Debug)]
pub enum ResolutionAttempt<T> {
    Resolved(T),
    NotApplicable(String),
    Failed(CredentialsError),
}

/// Inputs that decide which sources apply, captured once at startup
#[derive(Debug, Clone, Default)]
pub struct CredentialInputs {
    pub explicit_path: Option<PathBuf>,
    pub kubeconfig_env: Option<String>,
    pub in_cluster: bool,
    pub home_dir: Option<PathBuf>,
}

impl CredentialInputs {
    pub fn from_env(explicit_path: Option<PathBuf>) -> Self {
        Self {
            explicit_path,
            kubeconfig_env: std::env::var("KUBECONFIG").ok().filter(|v| !v.is_empty()),
            in_cluster: std::env::var_os("KUBERNETES_SERVICE_HOST").is_some(),
            home_dir: dirs::home_dir(),
        }
    }

    /// The concrete location a source would read, or why it does not apply
    pub fn plan(&self, source: CredentialSource) -> ResolutionAttempt<SourcePlan> {
        match source {
            CredentialSource::ExplicitPath => match &self.explicit_path {
                Some(path) if path.exists() => {
                    ResolutionAttempt::Resolved(SourcePlan::Files(vec![path.clone()]))
                }
                Some(path) => ResolutionAttempt::Failed(CredentialsError::KubeconfigNotFound(
                    path.display().to_string(),
                )),
                None => ResolutionAttempt::NotApplicable("no --kubeconfig given".to_string()),
            },
            CredentialSource::EnvKubeconfig => {
                let Some(value) = &self.kubeconfig_env else {
                    return ResolutionAttempt::NotApplicable("KUBECONFIG not set".to_string());
                };
                let files: Vec<PathBuf> = std::env::split_paths(value)
                    .filter(|p| p.exists())
                    .filter(|p| Some(p) != self.explicit_path.as_ref())
                    .collect();
                if files.is_empty() {
                    ResolutionAttempt::NotApplicable(format!(
                        "no readable file in KUBECONFIG={value}"
                    ))
                } else {
                    ResolutionAttempt::Resolved(SourcePlan::Files(files))
                }
            }
            CredentialSource::InCluster => {
                if self.in_cluster {
                    ResolutionAttempt::Resolved(SourcePlan::InCluster)
                } else {
                    ResolutionAttempt::NotApplicable("not running inside a pod".to_string())
                }
            }
            CredentialSource::HomeKubeconfig => {
                let Some(home) = &self.home_dir else {
                    return ResolutionAttempt::NotApplicable(
                        "home directory unknown".to_string(),
                    );
                };
                let path = home.join(".kube").join("config");
                if path.exists() {
                    ResolutionAttempt::Resolved(SourcePlan::Files(vec![path]))
                } else {
                    ResolutionAttempt::NotApplicable(format!("{} missing", path.display()))
                }
            }
        }
    }
}

/// What an applicable source will load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePlan {
    Files(Vec<PathBuf>),
    InCluster,
}

async fn load_files(files: &[PathBuf]) -> Result<Config, CredentialsError> {
    let mut merged: Option<Kubeconfig> = None;
    for path in files {
        let kc = read_kubeconfig(path)?;
        merged = Some(match merged {
            Some(acc) => acc.merge(kc).map_err(|e| invalid(path, e))?,
            None => kc,
        });
    }
    let Some(kc) = merged else {
        return Err(CredentialsError::NoCredentials("no kubeconfig files".to_string()));
    };
    Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
        .await
        .map_err(|e| CredentialsError::Client(e.to_string()))
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig, CredentialsError> {
    Kubeconfig::read_from(path).map_err(|e| invalid(path, e))
}

fn invalid(path: &Path, e: impl fmt::Display) -> CredentialsError {
    CredentialsError::InvalidKubeconfig {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

async fn attempt(inputs: &CredentialInputs, source: CredentialSource) -> ResolutionAttempt<Config> {
    match inputs.plan(source) {
        ResolutionAttempt::Resolved(SourcePlan::Files(files)) => match load_files(&files).await {
            Ok(config) => ResolutionAttempt::Resolved(config),
            Err(e) => ResolutionAttempt::Failed(e),
        },
        ResolutionAttempt::Resolved(SourcePlan::InCluster) => match Config::incluster() {
            Ok(config) => ResolutionAttempt::Resolved(config),
            Err(e) => ResolutionAttempt::Failed(CredentialsError::Client(e.to_string())),
        },
        ResolutionAttempt::NotApplicable(reason) => ResolutionAttempt::NotApplicable(reason),
        ResolutionAttempt::Failed(e) => ResolutionAttempt::Failed(e),
    }
}

/// Walk the sources in order and return the first usable configuration
pub async fn resolve_config(
    inputs: &CredentialInputs,
) -> Result<(CredentialSource, Config), CredentialsError> {
    let mut tried = Vec::new();
    for source in CredentialSource::ORDER {
        match attempt(inputs, source).await {
            ResolutionAttempt::Resolved(config) => {
                tracing::debug!("Using credentials from {}", source);
                return Ok((source, config));
            }
            ResolutionAttempt::NotApplicable(reason) => {
                tracing::debug!("Credential source {} not applicable: {}", source, reason);
                tried.push(format!("{source}: {reason}"));
            }
            ResolutionAttempt::Failed(e) => {
                // an explicit path that fails is never silently replaced by another source
                if source == CredentialSource::ExplicitPath {
                    return Err(e);
                }
                tracing::warn!("Credential source {} failed: {}", source, e);
                tried.push(format!("{source}: {e}"));
            }
        }
    }
    Err(CredentialsError::NoCredentials(tried.join("; ")))
}

/// Resolve credentials and build the cluster client
pub async fn connect(inputs: &CredentialInputs) -> Result<KubeClusterClient, CredentialsError> {
    let (_, config) = resolve_config(inputs).await?;
    let client = Client::try_from(config).map_err(|e| CredentialsError::Client(e.to_string()))?;
    Ok(KubeClusterClient::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inputs() -> CredentialInputs {
        CredentialInputs::default()
    }

    #[test]
    fn test_nothing_applicable() {
        for source in CredentialSource::ORDER {
            assert!(matches!(
                inputs().plan(source),
                ResolutionAttempt::NotApplicable(_)
            ));
        }
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let mut i = inputs();
        i.explicit_path = Some(PathBuf::from("/definitely/not/here"));
        assert!(matches!(
            i.plan(CredentialSource::ExplicitPath),
            ResolutionAttempt::Failed(CredentialsError::KubeconfigNotFound(_))
        ));
    }

    #[test]
    fn test_home_kubeconfig_plan() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".kube")).unwrap();
        std::fs::write(dir.path().join(".kube/config"), "apiVersion: v1").unwrap();

        let mut i = inputs();
        i.home_dir = Some(dir.path().to_path_buf());
        match i.plan(CredentialSource::HomeKubeconfig) {
            ResolutionAttempt::Resolved(SourcePlan::Files(files)) => {
                assert_eq!(files, vec![dir.path().join(".kube/config")]);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_env_kubeconfig_skips_missing_entries() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.yaml");
        std::fs::write(&present, "apiVersion: v1").unwrap();
        let missing = dir.path().join("b.yaml");

        let mut i = inputs();
        i.kubeconfig_env = Some(
            std::env::join_paths([&missing, &present])
                .unwrap()
                .to_string_lossy()
                .into_owned(),
        );
        match i.plan(CredentialSource::EnvKubeconfig) {
            ResolutionAttempt::Resolved(SourcePlan::Files(files)) => {
                assert_eq!(files, vec![present]);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_in_cluster_plan() {
        let mut i = inputs();
        i.in_cluster = true;
        assert!(matches!(
            i.plan(CredentialSource::InCluster),
            ResolutionAttempt::Resolved(SourcePlan::InCluster)
        ));
    }

    #[tokio::test]
    async fn test_resolve_reports_every_attempt() {
        let err = resolve_config(&inputs()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("KUBECONFIG not set"));
        assert!(msg.contains("not running inside a pod"));
    }
}
