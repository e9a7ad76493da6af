pub mod expr;
pub mod factory;
pub mod operators;

pub use expr::{ExprEngine, Predicate};
pub use factory::{build_store, register_builtins};
