/// Stable error codes attached to every engine error for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 2,
    ValidationError = 3,
    GraphNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    OperatorNotFound = 20,
    OperatorSetup = 21,
    DataNotFound = 30,
    IoError = 40,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GeneralError => "general_error",
            Self::ParseError => "parse_error",
            Self::ValidationError => "validation_error",
            Self::GraphNotFound => "graph_not_found",
            Self::DependencyError => "dependency_error",
            Self::CircularDependency => "circular_dependency",
            Self::OperatorNotFound => "operator_not_found",
            Self::OperatorSetup => "operator_setup",
            Self::DataNotFound => "data_not_found",
            Self::IoError => "io_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
