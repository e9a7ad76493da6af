use thiserror::Error;

use super::code::ErrorCode;

/// Errors raised while turning a cluster definition into an executable graph set.
///
/// All of them are fatal at load time: the cluster never becomes executable.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cluster '{0}' defines no graph")]
    EmptyCluster(String),

    #[error("graph '{0}' has no vertex")]
    EmptyGraph(String),

    #[error("duplicate graph '{graph}' with expect_version '{version}' in cluster '{cluster}'")]
    DuplicateGraph {
        cluster: String,
        graph: String,
        version: String,
    },

    #[error("duplicate vertex id '{vertex}' in graph '{graph}'")]
    DuplicateVertex { graph: String, vertex: String },

    #[error("duplicate output data '{data}' in graph '{graph}': produced by '{vertex}' and '{previous}'")]
    DuplicateData {
        graph: String,
        data: String,
        vertex: String,
        previous: String,
    },

    #[error("operator '{0}' is not registered")]
    OperatorNotFound(String),

    #[error("vertex '{vertex}' declares field '{field}' which operator '{operator}' does not expose")]
    UnknownField {
        vertex: String,
        operator: String,
        field: String,
    },

    #[error("vertex '{vertex}' declares a graph data entry with an empty field")]
    EmptyField { vertex: String },

    #[error("no producer for input '{data}' of vertex '{vertex}' in graph '{graph}'")]
    MissingInput {
        graph: String,
        vertex: String,
        data: String,
    },

    #[error("vertex '{vertex}' in graph '{graph}' references unknown vertex '{reference}'")]
    MissingVertex {
        graph: String,
        vertex: String,
        reference: String,
    },

    #[error("loop vertex '{vertex}' in graph '{graph}' has no target graph")]
    LoopWithoutGraph { graph: String, vertex: String },

    #[error("vertex '{vertex}' in graph '{graph}' sets both expect and expect_config")]
    ExpectConflict { graph: String, vertex: String },

    #[error("vertex '{vertex}' references unknown config setting '{setting}'")]
    UnknownConfigSetting { vertex: String, setting: String },

    #[error("invalid vertex '{vertex}' in graph '{graph}': {reason}")]
    InvalidVertex {
        graph: String,
        vertex: String,
        reason: &'static str,
    },

    #[error("circular dependency detected in graph '{graph}': {path}")]
    CircularDependency { graph: String, path: String },

    #[error("setup of operator '{operator}' for vertex '{vertex}' failed: {source}")]
    OperatorSetup {
        operator: String,
        vertex: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BuildError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyCluster(_) | Self::EmptyGraph(_) => ErrorCode::ValidationError,
            Self::DuplicateGraph { .. }
            | Self::DuplicateVertex { .. }
            | Self::DuplicateData { .. } => ErrorCode::ValidationError,
            Self::OperatorNotFound(_) => ErrorCode::OperatorNotFound,
            Self::UnknownField { .. } | Self::EmptyField { .. } => ErrorCode::ValidationError,
            Self::MissingInput { .. } | Self::MissingVertex { .. } => ErrorCode::DependencyError,
            Self::LoopWithoutGraph { .. }
            | Self::ExpectConflict { .. }
            | Self::UnknownConfigSetting { .. }
            | Self::InvalidVertex { .. } => ErrorCode::ValidationError,
            Self::CircularDependency { .. } => ErrorCode::CircularDependency,
            Self::OperatorSetup { .. } => ErrorCode::OperatorSetup,
            Self::Io(_) => ErrorCode::IoError,
            Self::Parse(_) => ErrorCode::ParseError,
        }
    }
}
