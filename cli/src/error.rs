use dagflow_core::api::{BuildError, ExecuteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("{path}: {source}")]
    Build {
        path: String,
        #[source]
        source: BuildError,
    },

    #[error("{0} cluster(s) failed to build")]
    Invalid(usize),

    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    // 0: success
    // 2: usage / config error
    // 3: cluster build error
    // 4: graph execution error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Usage(_) => 2,
            Self::Build { .. } | Self::Invalid(_) => 3,
            Self::Execute(_) => 4,
            Self::Io(_) => 2,
            Self::Anyhow(_) => 4,
        }
    }
}
