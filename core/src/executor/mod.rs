//! 运行时调度
//!
//! 静态图（`graph`）每个集群对应一个运行时对象池。一次调用从池中独占取出一个
//! `ClusterRuntime`，为目标图预留总线槽位、计算 config setting，然后按依赖关系
//! 并发调度顶点，全部完成后重置并归还到池中。
//!
//! ```text
//! GraphStore::execute_graph
//!   -> ClusterPool::checkout        (PooledCluster, RAII)
//!   -> ClusterRuntime::run          (bus/span/params, config settings)
//!   -> GraphRuntime::run            (spawn ready vertices, wait for completion)
//!   -> GraphRun::execute            (gating, guard, select_args, operator or sub-graph)
//! ```

mod cluster;
mod graph;
mod pool;
mod vertex;

pub use cluster::ClusterRuntime;
pub use pool::ClusterPool;

