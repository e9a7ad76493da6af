use thiserror::Error;

use super::code::ErrorCode;
use super::graph::BuildError;

/// Infrastructure failures of a graph invocation.
///
/// Operator failures never show up here; they stay local to their vertex.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("graph not found: '{graph}' in cluster '{cluster}'")]
    GraphNotFound { cluster: String, graph: String },

    #[error("failed to grow runtime pool: {0}")]
    Build(#[from] BuildError),

    #[error("data bus error: {0}")]
    Context(#[from] ContextError),
}

impl ExecuteError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::GraphNotFound { .. } => ErrorCode::GraphNotFound,
            Self::Build(e) => e.error_code(),
            Self::Context(e) => e.error_code(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("operator '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid slot '{field}' on operator '{operator}': {reason}")]
    InvalidSlot {
        operator: String,
        field: String,
        reason: &'static str,
    },
}

impl RegistryError {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::ValidationError
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("data '{0}' is not reserved in any reachable context")]
    DataNotFound(String),

    #[error("context already has a parent")]
    ParentExists,
}

impl ContextError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DataNotFound(_) => ErrorCode::DataNotFound,
            Self::ParentExists => ErrorCode::GeneralError,
        }
    }
}
