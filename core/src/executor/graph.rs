//! Per-run scheduling of one graph.
//!
//! Every vertex whose wait counter is zero is spawned as its own task. A finishing vertex
//! records its result in each successor's dependency slot and decrements the successor's
//! counter; the decrement that reaches zero spawns the successor. The run completes when the
//! pending-vertex counter reaches zero.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Notify;

use crate::context::ExecuteContext;
use crate::error::{BuildError, ExecuteError};
use crate::events::{DagEvent, EventCollector, ExecCode, Phase};
use crate::graph::{Expect, Graph, Guard, Vertex, VertexKind};
use crate::operator::binding::DynOperator;
use crate::operator::{OperatorRegistry, RunContext};
use crate::params::Params;

use super::vertex::{config_flag, isolate, CheckedOut, Outcome, VertexRuntime};

/// Runtime shadow of one built graph, owned by a cluster runtime.
pub(crate) struct GraphRuntime {
    pub(crate) graph: Arc<Graph>,
    vertices: Vec<VertexRuntime>,
}

impl GraphRuntime {
    pub(crate) fn build(
        graph: Arc<Graph>,
        registry: &OperatorRegistry,
        expr_operator: &str,
    ) -> Result<Self, BuildError> {
        let vertices = graph
            .vertices()
            .iter()
            .map(|v| VertexRuntime::build(v, registry, expr_operator))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { graph, vertices })
    }

    pub(crate) fn reset(&self) {
        for vertex in &self.vertices {
            vertex.reset();
        }
    }

    /// Schedule every vertex and wait until all of them are done.
    pub(crate) async fn run(
        self: &Arc<Self>,
        bus: ExecuteContext,
        params: Params,
        ctx: RunContext,
    ) -> Result<(), ExecuteError> {
        for vertex in &self.vertices {
            vertex.prepare();
        }
        let events = ctx.store().events().cloned();
        let run = Arc::new(GraphRun {
            runtime: self.clone(),
            bus,
            params,
            ctx,
            events,
            pending: AtomicUsize::new(self.vertices.len()),
            done: Notify::new(),
            infra_error: Mutex::new(None),
        });

        let ready: Vec<usize> = self
            .graph
            .vertices()
            .iter()
            .filter(|v| v.deps().is_empty())
            .map(Vertex::index)
            .collect();
        for idx in ready {
            GraphRun::spawn(&run, idx);
        }
        run.done.notified().await;

        let infra = run
            .infra_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match infra {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// State shared by the tasks of one graph invocation.
struct GraphRun {
    runtime: Arc<GraphRuntime>,
    bus: ExecuteContext,
    params: Params,
    ctx: RunContext,
    events: Option<EventCollector>,
    pending: AtomicUsize,
    done: Notify,
    infra_error: Mutex<Option<ExecuteError>>,
}

impl GraphRun {
    fn spawn(run: &Arc<Self>, idx: usize) {
        let run = run.clone();
        tokio::spawn(async move {
            // Last-resort barrier: completion must be signalled whatever happens in `execute`.
            let outcome = match AssertUnwindSafe(run.execute(idx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(graph = %run.ctx.graph(), vertex = %run.vertex(idx).id(), "vertex task panicked");
                    Outcome::Err
                }
            };
            run.vertex_done(idx, outcome);
        });
    }

    fn vertex(&self, idx: usize) -> &Vertex {
        &self.runtime.graph.vertices()[idx]
    }

    fn vertex_done(self: &Arc<Self>, idx: usize, outcome: Outcome) {
        let outcome = if outcome == Outcome::Skip && self.runtime.graph.skip_as_error() {
            Outcome::Err
        } else {
            outcome
        };
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.notify_one();
            return;
        }
        for &succ in self.vertex(idx).successors() {
            let Some(slot) = self.vertex(succ).dep_slot(idx) else {
                continue;
            };
            if self.runtime.vertices[succ].complete_dependency(slot, outcome) {
                Self::spawn(self, succ);
            }
        }
    }

    fn record_infra(&self, err: ExecuteError) {
        let mut slot = self
            .infra_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    async fn execute(&self, idx: usize) -> Outcome {
        let vertex = self.vertex(idx);
        let shadow = &self.runtime.vertices[idx];
        let start = Utc::now();

        for (slot, dep) in vertex.deps().iter().enumerate() {
            let actual = shadow.dependency_result(slot);
            let satisfied = match dep.expect {
                Expect::Any => true,
                Expect::Ok => actual == Outcome::Ok,
                Expect::Err => actual == Outcome::Err,
            };
            if !satisfied {
                return self.skipped(vertex, start, "dependency");
            }
        }

        let mut state = shadow.checkout();
        if !self.guard_passes(vertex, &mut state).await {
            return self.skipped(vertex, start, "guard");
        }
        let selected = self.select_params(vertex, &mut state).await;
        selected.set_parent(Some(&self.params));

        let exec_start = Utc::now();
        let result = match vertex.kind() {
            VertexKind::SubGraph => self.run_subgraph(vertex, &mut state, &selected).await,
            _ => self.run_operator(vertex, &mut state, &selected).await,
        };
        let end = Utc::now();

        let outcome = match &result {
            Ok(()) => Outcome::Ok,
            Err(err) => {
                tracing::debug!(
                    graph = %self.ctx.graph(),
                    vertex = %vertex.id(),
                    error = %err,
                    "vertex failed"
                );
                Outcome::Err
            }
        };
        if let Some(operator) = vertex.operator() {
            let code = if outcome == Outcome::Ok {
                ExecCode::Ok
            } else {
                ExecCode::Failed
            };
            self.emit(vertex, operator, Phase::PreExec, start, exec_start, ExecCode::Ok);
            self.emit(vertex, operator, Phase::Exec, exec_start, end, code);
        }
        tracing::trace!(vertex = %vertex.id(), outcome = ?outcome, "vertex done");
        outcome
    }

    fn skipped(&self, vertex: &Vertex, start: DateTime<Utc>, reason: &str) -> Outcome {
        tracing::debug!(
            graph = %self.ctx.graph(),
            vertex = %vertex.id(),
            reason,
            "vertex skipped"
        );
        if let Some(operator) = vertex.operator() {
            self.emit(vertex, operator, Phase::Exec, start, Utc::now(), ExecCode::Skipped);
        }
        Outcome::Skip
    }

    async fn eval_expr(
        &self,
        vertex: &Vertex,
        instance: &mut crate::operator::OperatorInstance,
    ) -> bool {
        let op = instance.op();
        op.set_context(Some(self.bus.clone()));
        let result = isolate(vertex.id(), op.execute(&self.ctx, &self.params)).await;
        op.set_context(None);
        result.is_ok()
    }

    async fn guard_passes(&self, vertex: &Vertex, state: &mut CheckedOut<'_>) -> bool {
        match vertex.guard() {
            None => true,
            Some(Guard::Config { name, negate }) => config_flag(&self.params, name, *negate),
            Some(Guard::Expr(_)) => match state.guard.as_mut() {
                Some(instance) => self.eval_expr(vertex, instance).await,
                None => false,
            },
        }
    }

    /// First matching conditional argument branch, else the vertex's own arguments.
    async fn select_params(&self, vertex: &Vertex, state: &mut CheckedOut<'_>) -> Params {
        for (idx, branch) in vertex.select_args().iter().enumerate() {
            let hit = match &branch.guard {
                Guard::Config { name, negate } => config_flag(&self.params, name, *negate),
                Guard::Expr(_) => match state.select.get_mut(idx).and_then(|b| b.eval.as_mut()) {
                    Some(instance) => self.eval_expr(vertex, instance).await,
                    None => false,
                },
            };
            if hit {
                if let Some(branch) = state.select.get(idx) {
                    return branch.params.clone();
                }
            }
        }
        state.params.clone()
    }

    async fn run_operator(
        &self,
        vertex: &Vertex,
        state: &mut CheckedOut<'_>,
        args: &Params,
    ) -> anyhow::Result<()> {
        let Some(instance) = state.operator.as_mut() else {
            anyhow::bail!("vertex '{}' has no operator instance", vertex.id());
        };
        let name = instance.name().to_string();
        let (meta, op) = instance.parts();
        let span = self.bus.span().map(|s| s.new_child(&name));

        // Slot injection, execution and publishing form one unit behind the fault barrier.
        let result = isolate(vertex.id(), async {
            op.set_context(Some(self.bus.clone()));
            op.set_span(span.clone());
            self.inject_inputs(vertex, &mut *op);
            for (slot, param) in meta.params.iter().enumerate() {
                if let Some(value) = args.get(&param.name) {
                    if !op.set_param(slot, &value) {
                        tracing::warn!(
                            vertex = %vertex.id(),
                            param = %param.name,
                            value = %value,
                            expected = param.type_name,
                            "param type mismatch"
                        );
                    }
                }
            }

            op.execute(&self.ctx, args).await?;

            for output in vertex.outputs() {
                let value = op.take_output(output.slot);
                if let Err(err) = self.bus.publish(&output.id, value) {
                    tracing::warn!(vertex = %vertex.id(), error = %err, "output not published");
                }
            }
            Ok(())
        })
        .await;

        if let Some(span) = &span {
            if let Err(err) = &result {
                span.set_attribute("err", &err.to_string());
            }
            span.end();
        }
        result
    }

    fn inject_inputs(&self, vertex: &Vertex, op: &mut dyn DynOperator) {
        for input in vertex.inputs() {
            if input.aggregate {
                let mut values = HashMap::with_capacity(input.ids.len());
                for id in &input.ids {
                    match self.bus.get_raw(id) {
                        Some(value) => {
                            values.insert(id.name.clone(), value);
                        }
                        None => tracing::debug!(vertex = %vertex.id(), data = %id, "aggregate input missing"),
                    }
                }
                op.set_aggregate(input.slot, values);
            } else if let Some(id) = input.ids.first() {
                let value = if input.is_move {
                    self.bus.take(id)
                } else {
                    self.bus.get_raw(id)
                };
                if value.is_none() {
                    tracing::debug!(vertex = %vertex.id(), data = %id, "input not present on bus");
                }
                op.set_input(input.slot, value);
            }
        }
    }

    async fn run_subgraph(
        &self,
        vertex: &Vertex,
        state: &mut CheckedOut<'_>,
        args: &Params,
    ) -> anyhow::Result<()> {
        let Some(target) = vertex.target() else {
            anyhow::bail!("vertex '{}' has no target graph", vertex.id());
        };
        let Some(pool) = self.ctx.store().pool(&target.cluster) else {
            let err = ExecuteError::GraphNotFound {
                cluster: target.cluster.clone(),
                graph: target.graph.clone(),
            };
            tracing::error!(vertex = %vertex.id(), error = %err, "sub-graph cluster missing");
            let message = err.to_string();
            self.record_infra(err);
            anyhow::bail!(message);
        };
        let child = match pool.checkout() {
            Ok(child) => child,
            Err(err) => {
                let message = err.to_string();
                self.record_infra(err.into());
                anyhow::bail!(message);
            }
        };
        let result = child
            .run(&self.ctx, &self.bus, &target.graph, args, vertex.child_idx())
            .await;
        // Held until reset so the child bus stays readable by later vertices.
        state.subgraph = Some(child);
        result.map_err(|err| {
            let message = err.to_string();
            self.record_infra(err);
            anyhow::anyhow!(message)
        })
    }

    fn emit(
        &self,
        vertex: &Vertex,
        operator: &str,
        phase: Phase,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        code: ExecCode,
    ) {
        if let Some(events) = &self.events {
            events.collect(DagEvent {
                run_id: self.ctx.run_id().to_string(),
                cluster: self.ctx.cluster().to_string(),
                graph: self.ctx.graph().to_string(),
                vertex: Some(vertex.id().to_string()),
                operator: Some(operator.to_string()),
                phase,
                start,
                end,
                code,
            });
        }
    }
}
