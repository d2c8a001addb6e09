use thiserror::Error;

use hrflow_core::approvals::DecisionRefusal;
use hrflow_core::errors::{DomainError, InterfaceError};
use hrflow_db::RepositoryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Stable label used by the CLI's `error_class` field.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Configuration(_) => "configuration",
            Self::Repository(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::BadRequest(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::Unauthorized(_) => InterfaceError::Unauthorized { message, correlation_id },
            Self::Configuration(_) => InterfaceError::Internal { message, correlation_id },
            Self::Repository(_) => InterfaceError::ServiceUnavailable { message, correlation_id },
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<DecisionRefusal> for EngineError {
    fn from(value: DecisionRefusal) -> Self {
        if value.is_authorization() {
            Self::Unauthorized(value.reason())
        } else {
            Self::BadRequest(value.reason())
        }
    }
}
