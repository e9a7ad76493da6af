//! Built-in operators registered by `register_builtins`.

pub mod expr;
pub mod noop;
pub mod while_loop;

pub use expr::ExprOperator;
pub use noop::NoopOperator;
pub use while_loop::WhileOperator;
