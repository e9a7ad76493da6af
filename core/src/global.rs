//! Optional process-wide store for hosts that want a free `execute_graph` function.

use std::sync::OnceLock;

use crate::cancel::Cancellation;
use crate::context::ExecuteContext;
use crate::error::ExecuteError;
use crate::params::Params;
use crate::store::GraphStore;

static STORE: OnceLock<GraphStore> = OnceLock::new();

/// Install the process-wide store. Returns the store back if one is already installed.
pub fn install(store: GraphStore) -> Result<(), GraphStore> {
    STORE.set(store)
}

pub fn store() -> Option<&'static GraphStore> {
    STORE.get()
}

/// `GraphStore::execute_graph` on the installed store. Without one every graph is unknown.
pub async fn execute_graph(
    cancel: &Cancellation,
    cluster: &str,
    graph: &str,
    bus: &ExecuteContext,
    params: &Params,
) -> Result<(), ExecuteError> {
    match STORE.get() {
        Some(store) => store.execute_graph(cancel, cluster, graph, bus, params).await,
        None => {
            tracing::warn!(cluster, graph, "no graph store installed");
            Err(ExecuteError::GraphNotFound {
                cluster: cluster.to_string(),
                graph: graph.to_string(),
            })
        }
    }
}
