use thiserror::Error;

/// Failures surfaced by the chatbot service to its callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn internal(context: &str, err: &anyhow::Error) -> Self {
        ServiceError::Internal(format!("{context}: {err:#}"))
    }
}
