//! dagflow 核心库
//!
//! 进程内 DAG 执行引擎：声明式的集群/图/顶点定义在加载时构建为静态图模型，
//! 运行时按依赖关系并发调度算子，通过分层数据总线在顶点之间传递类型化数据。

pub mod api;
pub mod cancel;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod events;
pub mod executor;
pub mod global;
pub mod graph;
pub mod operator;
pub mod params;
pub mod span;
pub mod store;

pub use store::GraphStore;
