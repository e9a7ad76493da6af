pub mod code;
pub mod graph;
pub mod runtime;

pub use code::ErrorCode;
pub use graph::BuildError;
pub use runtime::{ContextError, ExecuteError, RegistryError};
