use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::Cancellation;
use crate::params::Params;
use crate::store::GraphStore;

/// An external unit of work bound to graph vertices.
///
/// Instances are pooled per registered kind and reused across unrelated runs: `reset` must
/// clear every piece of operator-owned state.
#[async_trait]
pub trait Operator: Send + 'static {
    /// Called once per instance acquisition with the vertex's declared args.
    fn setup(&mut self, _args: &Params) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run one invocation. An `Err` marks the vertex failed; it never aborts the graph.
    async fn execute(&mut self, ctx: &RunContext, args: &Params) -> anyhow::Result<()>;

    fn reset(&mut self) {}
}

/// Per-invocation handle passed to `Operator::execute`.
#[derive(Clone)]
pub struct RunContext {
    store: GraphStore,
    cancel: Cancellation,
    cluster: Arc<str>,
    graph: Arc<str>,
    run_id: Arc<str>,
}

impl RunContext {
    pub(crate) fn new(
        store: GraphStore,
        cancel: Cancellation,
        cluster: &str,
        graph: &str,
        run_id: Arc<str>,
    ) -> Self {
        Self {
            store,
            cancel,
            cluster: Arc::from(cluster),
            graph: Arc::from(graph),
            run_id,
        }
    }

    /// Store used to dispatch nested graph invocations.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub(crate) fn run_id_arc(&self) -> Arc<str> {
        self.run_id.clone()
    }
}
