//! Process-facing entry point: loaded clusters, their runtime pools and graph invocation.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::config::{self, ClusterDef};
use crate::context::ExecuteContext;
use crate::error::{BuildError, ExecuteError};
use crate::events::EventCollector;
use crate::executor::ClusterPool;
use crate::graph::Cluster;
use crate::operator::{OperatorRegistry, RunContext};
use crate::params::Params;

/// Loaded clusters keyed by name. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    registry: Arc<OperatorRegistry>,
    clusters: RwLock<HashMap<String, Arc<ClusterPool>>>,
    events: Option<EventCollector>,
}

impl GraphStore {
    /// Freeze `registry`; operators can no longer be registered afterwards.
    pub fn new(registry: OperatorRegistry) -> Self {
        Self::build(registry, None)
    }

    pub fn with_events(registry: OperatorRegistry, events: EventCollector) -> Self {
        Self::build(registry, Some(events))
    }

    fn build(registry: OperatorRegistry, events: Option<EventCollector>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                registry: Arc::new(registry),
                clusters: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.inner.registry
    }

    pub fn events(&self) -> Option<&EventCollector> {
        self.inner.events.as_ref()
    }

    /// Build `def` under `name` and pre-fill its runtime pool. A cluster already loaded under
    /// the same name is replaced; runs holding its runtimes finish on the old definition.
    pub fn load_cluster(&self, name: &str, def: &ClusterDef) -> Result<Arc<Cluster>, BuildError> {
        let cluster = Arc::new(Cluster::build(name, def, &self.inner.registry)?);
        let pool = ClusterPool::new(cluster.clone(), self.inner.registry.clone())?;
        let replaced = self
            .inner
            .clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), pool)
            .is_some();
        tracing::info!(
            cluster = %name,
            graphs = cluster.graphs().count(),
            pool_size = cluster.pool_size(),
            replaced,
            "cluster loaded"
        );
        Ok(cluster)
    }

    pub fn load_cluster_str(&self, name: &str, toml: &str) -> Result<Arc<Cluster>, BuildError> {
        let def = config::parse_cluster(toml)?;
        self.load_cluster(name, &def)
    }

    /// Load a cluster document; the cluster is named after the file stem.
    pub fn load_cluster_file(&self, path: &Path) -> Result<Arc<Cluster>, BuildError> {
        let (name, def) = config::load_cluster_file(path)?;
        self.load_cluster(&name, &def)
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.pool(name).map(|pool| pool.cluster().clone())
    }

    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn pool(&self, name: &str) -> Option<Arc<ClusterPool>> {
        self.inner
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Run `graph` of `cluster` to completion.
    ///
    /// Values the caller reserved on `bus` (via `insert` or `fill_entry`) are visible to the
    /// graph, and graph outputs whose ids the caller reserved are published back into `bus`.
    /// Vertex failures never surface here; only infrastructure errors do.
    pub async fn execute_graph(
        &self,
        cancel: &Cancellation,
        cluster: &str,
        graph: &str,
        bus: &ExecuteContext,
        params: &Params,
    ) -> Result<(), ExecuteError> {
        let run_id: Arc<str> = Arc::from(Uuid::new_v4().to_string());
        tracing::info!(cluster, graph, run_id = %run_id, "execute graph");
        let ctx = RunContext::new(self.clone(), cancel.clone(), cluster, graph, run_id);
        self.dispatch(&ctx, cluster, graph, bus, params).await
    }

    /// Graph invocation issued from inside a running operator. The caller's run id and
    /// cancellation carry over; `bus` is usually the operator's injected context.
    pub async fn execute_nested(
        &self,
        ctx: &RunContext,
        cluster: &str,
        graph: &str,
        bus: &ExecuteContext,
        params: &Params,
    ) -> Result<(), ExecuteError> {
        let nested = RunContext::new(
            self.clone(),
            ctx.cancellation().clone(),
            cluster,
            graph,
            ctx.run_id_arc(),
        );
        self.dispatch(&nested, cluster, graph, bus, params).await
    }

    async fn dispatch(
        &self,
        ctx: &RunContext,
        cluster: &str,
        graph: &str,
        bus: &ExecuteContext,
        params: &Params,
    ) -> Result<(), ExecuteError> {
        let Some(pool) = self.pool(cluster) else {
            tracing::error!(cluster, graph, "cluster not loaded");
            return Err(ExecuteError::GraphNotFound {
                cluster: cluster.to_string(),
                graph: graph.to_string(),
            });
        };
        let runtime = pool.checkout()?;
        runtime.run(ctx, bus, graph, params, None).await
    }
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("operators", &self.inner.registry.len())
            .field("clusters", &self.cluster_names())
            .finish()
    }
}
