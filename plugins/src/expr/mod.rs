//! 谓词表达式引擎
//!
//! 基于 rhai 的布尔表达式：门控顶点、`expect` 守卫、`select_args` 条件分支、
//! config setting 以及循环条件都通过这里编译和求值。
//!
//! 表达式中可见的名字：
//! - 参数作用域展开后的每个键（就近覆盖），例如 `loopIdx < 3`
//! - `ARGS.x` / `ARGS["x"]`：参数查找，缺失时为 `false`
//! - `VARS.x`：数据总线查找，依次尝试 bool、String、i64、i32、f64、f32，缺失时为 `false`

mod engine;
mod selectors;

pub use engine::{ExprEngine, Predicate};
