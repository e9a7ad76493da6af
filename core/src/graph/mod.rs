pub mod cluster;
pub mod dot;
pub mod graph;
pub mod vertex;

pub use cluster::{Cluster, ConfigSetting};
pub use graph::Graph;
pub use vertex::{
    Dependency, Expect, GraphTarget, Guard, InputBinding, OutputBinding, SelectArgs, Vertex,
    VertexKind,
};

/// Setup argument carrying a gate or loop predicate.
pub const EXPR_ARG: &str = "__expr";
/// Loop driver setup arguments.
pub const WHILE_CLUSTER_ARG: &str = "__while_cluster";
pub const WHILE_GRAPH_ARG: &str = "__while_graph";
pub const WHILE_ASYNC_ARG: &str = "__while_async";
/// Loop index visible to loop predicates and loop bodies.
pub const LOOP_INDEX_ARG: &str = "loopIdx";
