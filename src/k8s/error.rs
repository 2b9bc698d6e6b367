use thiserror::Error;

/// Failure surfaced by a [`ClusterClient`](super::ClusterClient) call
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict updating {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("the kube client returned an error: `{0}`")]
    Kube(String),

    #[error("failed to parse object: `{0}`")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Translate a kube error, naming the object it concerned
    pub fn from_kube(err: kube::Error, object: impl Into<String>) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => ClientError::NotFound(object.into()),
                409 => ClientError::Conflict(object.into()),
                403 => ClientError::Forbidden(ae.message),
                code => ClientError::Api {
                    code,
                    message: ae.message,
                },
            },
            kube::Error::SerdeError(e) => ClientError::Serialization(e),
            other => ClientError::Kube(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("kubeconfig not found at {0}")]
    KubeconfigNotFound(String),

    #[error("failed to load kubeconfig {path}: {message}")]
    InvalidKubeconfig { path: String, message: String },

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("no usable credentials found ({0})")]
    NoCredentials(String),
}
