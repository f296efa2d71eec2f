use crate::config::ValidationError;
use http::StatusCode;
use thiserror::Error;

/// Result type alias for composite operations
pub type Result<T, E = CompositeError> = std::result::Result<T, E>;

/// Domain error taxonomy shared by the read, write, and consume paths.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositeError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    /// Any transport or protocol failure that doesn't map to the above.
    /// `status` is absent for failures that never produced a response,
    /// e.g. connect errors and timeouts.
    #[error("unexpected error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Unexpected {
        status: Option<u16>,
        message: String,
    },

    #[error("event processing failed: {0}")]
    ProcessingFailure(String),
}

impl CompositeError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        CompositeError::Unexpected {
            status: None,
            message: message.into(),
        }
    }

    /// Status code reported to clients of the composite API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CompositeError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CompositeError::NotFound(_) => StatusCode::NOT_FOUND,
            CompositeError::Unexpected { .. } | CompositeError::ProcessingFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            CompositeError::InvalidInput(m)
            | CompositeError::NotFound(m)
            | CompositeError::ProcessingFailure(m) => m.clone(),
            CompositeError::Unexpected { message, .. } => message.clone(),
        }
    }
}

/// Failures that stop the service from starting or serving.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("startup failed: {0}")]
    Startup(String),
}
