use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::BoxFuture;

use crate::context::ExecuteContext;
use crate::error::{BuildError, ExecuteError};
use crate::events::{DagEvent, ExecCode, Phase};
use crate::graph::{Cluster, LOOP_INDEX_ARG};
use crate::operator::{OperatorInstance, OperatorRegistry, RunContext};
use crate::params::Params;

use super::graph::GraphRuntime;
use super::vertex::{expr_instance, isolate};

/// Runtime shadow of a cluster: one bus, one running scope and a runtime per graph.
///
/// Cloning yields another handle to the same runtime; the pool hands out one handle at a time.
#[derive(Clone)]
pub struct ClusterRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    cluster: Arc<Cluster>,
    graphs: HashMap<String, Arc<GraphRuntime>>,
    bus: ExecuteContext,
    running_params: Params,
    settings: Mutex<Vec<OperatorInstance>>,
}

impl ClusterRuntime {
    pub(crate) fn build(
        cluster: &Arc<Cluster>,
        registry: &OperatorRegistry,
    ) -> Result<Self, BuildError> {
        let mut graphs = HashMap::with_capacity(cluster.graphs.len());
        for (name, graph) in &cluster.graphs {
            let runtime = GraphRuntime::build(graph.clone(), registry, cluster.expr_operator())?;
            graphs.insert(name.clone(), Arc::new(runtime));
        }
        let mut settings = Vec::with_capacity(cluster.config_settings().len());
        for setting in cluster.config_settings() {
            settings.push(expr_instance(
                registry,
                cluster.expr_operator(),
                &setting.cond,
                &setting.name,
            )?);
        }
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                cluster: cluster.clone(),
                graphs,
                bus: ExecuteContext::new(),
                running_params: Params::new(),
                settings: Mutex::new(settings),
            }),
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.inner.cluster
    }

    /// Clear the bus, the running scope and every vertex's per-run state.
    pub(crate) fn reset(&self) {
        for graph in self.inner.graphs.values() {
            graph.reset();
        }
        self.inner.bus.reset();
        self.inner.running_params.reset();
    }

    /// Run `graph` under `parent_bus`. A `child_idx` links this runtime's bus into the parent's
    /// child list so the parent can read what the graph publishes.
    pub(crate) fn run<'a>(
        &'a self,
        caller: &'a RunContext,
        parent_bus: &'a ExecuteContext,
        graph: &'a str,
        params: &'a Params,
        child_idx: Option<usize>,
    ) -> BoxFuture<'a, Result<(), ExecuteError>> {
        Box::pin(async move {
            let inner = &self.inner;
            let cluster = inner.cluster.name();
            let Some(runtime) = inner.graphs.get(graph) else {
                tracing::error!(cluster, graph, "graph not found");
                return Err(ExecuteError::GraphNotFound {
                    cluster: cluster.to_string(),
                    graph: graph.to_string(),
                });
            };
            let start = Utc::now();
            let full_name = runtime.graph.full_name();

            let bus = &inner.bus;
            bus.set_parent(parent_bus)?;
            let span = parent_bus.span().map(|parent| {
                let span = parent.new_child(&full_name);
                if let Some(idx) = params.get(LOOP_INDEX_ARG) {
                    span.set_attribute("LoopIdx", &idx.to_string());
                }
                span
            });
            bus.set_span(span.clone());
            if let Some(idx) = child_idx {
                parent_bus.attach_child(idx, bus);
            }
            for id in runtime.graph.outputs() {
                // Outputs already reserved upstream of a top-level call are published there.
                if child_idx.is_none() && parent_bus.contains(id) {
                    continue;
                }
                bus.fill_entry(id);
            }
            bus.reserve_children(runtime.graph.subgraph_count());

            let running = &inner.running_params;
            running.reset();
            running.set_parent(Some(params));

            let ctx = RunContext::new(
                caller.store().clone(),
                caller.cancellation().clone(),
                cluster,
                graph,
                caller.run_id_arc(),
            );
            self.eval_settings(&ctx).await;

            tracing::debug!(graph = %full_name, run_id = %ctx.run_id(), "graph start");
            let result = runtime.run(bus.clone(), running.clone(), ctx.clone()).await;
            let end = Utc::now();

            if let Some(events) = caller.store().events() {
                events.collect(DagEvent {
                    run_id: ctx.run_id().to_string(),
                    cluster: cluster.to_string(),
                    graph: graph.to_string(),
                    vertex: None,
                    operator: None,
                    phase: Phase::Exec,
                    start,
                    end,
                    code: if result.is_ok() {
                        ExecCode::Ok
                    } else {
                        ExecCode::Failed
                    },
                });
            }
            if let Some(span) = span {
                span.end();
            }
            tracing::debug!(
                graph = %full_name,
                elapsed_ms = (end - start).num_milliseconds(),
                ok = result.is_ok(),
                "graph done"
            );
            result
        })
    }

    /// Evaluate every config setting into the running scope, in declaration order.
    async fn eval_settings(&self, ctx: &RunContext) {
        let inner = &self.inner;
        if inner.cluster.config_settings().is_empty() {
            return;
        }
        let mut evals = std::mem::take(&mut *inner.settings.lock().unwrap_or_else(PoisonError::into_inner));
        for (setting, eval) in inner.cluster.config_settings().iter().zip(evals.iter_mut()) {
            let op = eval.op();
            op.set_context(Some(inner.bus.clone()));
            let value = isolate(&setting.name, op.execute(ctx, &inner.running_params))
                .await
                .is_ok();
            op.set_context(None);
            inner.running_params.set(setting.name.clone(), value);
        }
        *inner.settings.lock().unwrap_or_else(PoisonError::into_inner) = evals;
    }
}
