pub mod graph;
pub mod load;
pub mod types;

pub use graph::{
    ClusterDef, ConfigSettingDef, GraphDataDef, GraphDef, SelectArgsDef, VertexDef,
    DEFAULT_EXPR_OPERATOR, DEFAULT_WHILE_OPERATOR,
};
pub use load::{load_cluster_file, load_engine_config, parse_cluster, parse_engine_config};
pub use types::{EngineConfig, EventsOutConfig, LoggingConfig};
