use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::anyhow;
use futures::FutureExt;

use crate::error::BuildError;
use crate::graph::{Guard, Vertex};
use crate::operator::{OperatorInstance, OperatorRegistry};
use crate::params::{ParamValue, Params};

use super::pool::PooledCluster;

/// Result of one vertex in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Outcome {
    Pending = 0,
    Ok = 1,
    Err = 2,
    Skip = 3,
}

impl Outcome {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Ok,
            2 => Self::Err,
            3 => Self::Skip,
            _ => Self::Pending,
        }
    }
}

/// Per-run mutable shadow of a built vertex.
pub(crate) struct VertexRuntime {
    pub(crate) waiting: AtomicUsize,
    pub(crate) dep_results: Vec<AtomicU8>,
    state: Mutex<VertexState>,
}

/// Pooled resources bound to one vertex for the lifetime of its cluster runtime.
#[derive(Default)]
pub(crate) struct VertexState {
    pub(crate) operator: Option<OperatorInstance>,
    pub(crate) params: Params,
    pub(crate) guard: Option<OperatorInstance>,
    pub(crate) select: Vec<SelectBranch>,
    pub(crate) subgraph: Option<PooledCluster>,
}

pub(crate) struct SelectBranch {
    pub(crate) params: Params,
    pub(crate) eval: Option<OperatorInstance>,
}

impl VertexRuntime {
    pub(crate) fn build(
        vertex: &Vertex,
        registry: &OperatorRegistry,
        expr_operator: &str,
    ) -> Result<Self, BuildError> {
        let operator = match vertex.operator() {
            Some(name) => {
                let entry = registry
                    .get(name)
                    .ok_or_else(|| BuildError::OperatorNotFound(name.to_string()))?;
                let mut instance = entry.acquire();
                instance
                    .op()
                    .setup(&Params::from_map(vertex.args().clone()))
                    .map_err(|source| BuildError::OperatorSetup {
                        operator: name.to_string(),
                        vertex: vertex.id().to_string(),
                        source,
                    })?;
                Some(instance)
            }
            None => None,
        };

        let guard = match vertex.guard() {
            Some(Guard::Expr(expr)) => Some(expr_instance(registry, expr_operator, expr, vertex.id())?),
            _ => None,
        };

        let mut select = Vec::with_capacity(vertex.select_args().len());
        for branch in vertex.select_args() {
            let eval = match &branch.guard {
                Guard::Expr(expr) => Some(expr_instance(registry, expr_operator, expr, vertex.id())?),
                Guard::Config { .. } => None,
            };
            select.push(SelectBranch {
                params: Params::from_map(branch.args.clone()),
                eval,
            });
        }

        Ok(Self {
            waiting: AtomicUsize::new(vertex.deps().len()),
            dep_results: vertex
                .deps()
                .iter()
                .map(|_| AtomicU8::new(Outcome::Pending as u8))
                .collect(),
            state: Mutex::new(VertexState {
                operator,
                params: Params::from_map(vertex.args().clone()),
                guard,
                select,
                subgraph: None,
            }),
        })
    }

    /// Scheduling state for a fresh run.
    pub(crate) fn prepare(&self) {
        self.waiting.store(self.dep_results.len(), Ordering::Release);
        for slot in &self.dep_results {
            slot.store(Outcome::Pending as u8, Ordering::Release);
        }
    }

    /// Release per-run resources. A held sub-graph runtime goes back to its pool here.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subgraph = None;
        state.params.detach();
        for branch in &state.select {
            branch.params.detach();
        }
        if let Some(instance) = state.operator.as_mut() {
            let op = instance.op();
            let cleared = std::panic::catch_unwind(AssertUnwindSafe(|| {
                op.clear_bindings();
                op.reset();
            }));
            if cleared.is_err() {
                tracing::error!(operator = %instance.name(), "operator panicked during reset");
            }
        }
        drop(state);
        self.prepare();
    }

    /// Move the pooled state out for the duration of one execution.
    pub(crate) fn checkout(&self) -> CheckedOut<'_> {
        let state = std::mem::take(&mut *self.state.lock().unwrap_or_else(PoisonError::into_inner));
        CheckedOut { home: &self.state, state }
    }

    /// Record a producer's result; returns true when this was the last outstanding dependency.
    pub(crate) fn complete_dependency(&self, slot: usize, outcome: Outcome) -> bool {
        if let Some(result) = self.dep_results.get(slot) {
            result.store(outcome as u8, Ordering::Release);
        }
        self.waiting.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn dependency_result(&self, slot: usize) -> Outcome {
        self.dep_results
            .get(slot)
            .map(|r| Outcome::from_u8(r.load(Ordering::Acquire)))
            .unwrap_or(Outcome::Pending)
    }
}

/// Vertex state moved out of its mutex; put back on drop, including during unwinding.
pub(crate) struct CheckedOut<'a> {
    home: &'a Mutex<VertexState>,
    state: VertexState,
}

impl Deref for CheckedOut<'_> {
    type Target = VertexState;

    fn deref(&self) -> &VertexState {
        &self.state
    }
}

impl DerefMut for CheckedOut<'_> {
    fn deref_mut(&mut self) -> &mut VertexState {
        &mut self.state
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        let state = std::mem::take(&mut self.state);
        *self.home.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Expression-operator instance compiled for one predicate.
pub(crate) fn expr_instance(
    registry: &OperatorRegistry,
    expr_operator: &str,
    expr: &str,
    owner: &str,
) -> Result<OperatorInstance, BuildError> {
    let entry = registry
        .get(expr_operator)
        .ok_or_else(|| BuildError::OperatorNotFound(expr_operator.to_string()))?;
    let mut instance = entry.acquire();
    let args = Params::new();
    args.set(crate::graph::EXPR_ARG, ParamValue::Str(expr.to_string()));
    instance
        .op()
        .setup(&args)
        .map_err(|source| BuildError::OperatorSetup {
            operator: expr_operator.to_string(),
            vertex: owner.to_string(),
            source,
        })?;
    Ok(instance)
}

/// Boolean config-setting lookup. Missing or non-boolean values read as false.
pub(crate) fn config_flag(params: &Params, name: &str, negate: bool) -> bool {
    params.get_bool(name).map(|b| b != negate).unwrap_or(false)
}

/// Run `fut`, converting a panic into an error.
pub(crate) async fn isolate<F>(vertex: &str, fut: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                vertex,
                panic = %message,
                backtrace = %std::backtrace::Backtrace::force_capture(),
                "vertex execution panicked"
            );
            Err(anyhow!("vertex '{vertex}' panicked: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    #[test]
    fn test_config_flag_lookup() {
        let params = Params::new();
        params.set("on", true);
        params.set("text", "yes");
        assert!(config_flag(&params, "on", false));
        assert!(!config_flag(&params, "on", true));
        assert!(!config_flag(&params, "missing", true));
        assert!(!config_flag(&params, "text", false));
    }

    #[test]
    fn test_isolate_converts_panic() {
        let result = tokio_test::block_on(isolate("v", async {
            if true {
                panic!("boom");
            }
            Ok(())
        }));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [Outcome::Pending, Outcome::Ok, Outcome::Err, Outcome::Skip] {
            assert_eq!(Outcome::from_u8(outcome as u8), outcome);
        }
    }
}
