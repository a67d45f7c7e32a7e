//! Error types for kubeconfig operations

/// Errors from reading, editing or writing a kubeconfig file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubeconfig I/O error: {0}")]
    Io(String),

    #[error("failed to parse kubeconfig: {0}")]
    Yaml(String),

    #[error("context {0} not found")]
    ContextNotFound(String),

    #[error("current context not found")]
    NoCurrentContext,
}

/// Result alias for kubeconfig operations.
pub type Result<T> = std::result::Result<T, Error>;
