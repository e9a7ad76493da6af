//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `dagflow_core::api` instead of reaching into internal modules.

pub use crate::cancel::Cancellation;
pub use crate::config::{
    load_cluster_file, load_engine_config, parse_cluster, parse_engine_config, ClusterDef,
    ConfigSettingDef, EngineConfig, EventsOutConfig, GraphDataDef, GraphDef, LoggingConfig,
    SelectArgsDef, VertexDef, DEFAULT_EXPR_OPERATOR, DEFAULT_WHILE_OPERATOR,
};
pub use crate::context::ExecuteContext;
pub use crate::data::{DataId, DataType, DataValue};
pub use crate::error::{BuildError, ContextError, ErrorCode, ExecuteError, RegistryError};
pub use crate::events::{start_events_out, DagEvent, EventCollector, ExecCode, Phase};
pub use crate::graph::{
    Cluster, Expect, Graph, Guard, Vertex, VertexKind, EXPR_ARG, LOOP_INDEX_ARG,
    WHILE_ASYNC_ARG, WHILE_CLUSTER_ARG, WHILE_GRAPH_ARG,
};
pub use crate::operator::{Operator, OperatorBuilder, OperatorMeta, OperatorRegistry, RunContext};
pub use crate::params::{FromParam, ParamValue, Params};
pub use crate::span::{Span, SpanRef, TracingSpan};
pub use crate::store::GraphStore;
