use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::future::join_all;

use dagflow_core::api::{
    ExecuteContext, Operator, OperatorBuilder, Params, RunContext, DEFAULT_WHILE_OPERATOR,
    EXPR_ARG, LOOP_INDEX_ARG, WHILE_ASYNC_ARG, WHILE_CLUSTER_ARG, WHILE_GRAPH_ARG,
};

use crate::expr::{ExprEngine, Predicate};

/// Loop driver: runs the target graph while the predicate holds.
///
/// Every iteration sees `loopIdx` (starting at 0) on top of the vertex's argument scope and
/// runs under the vertex's data bus, so body graphs read and publish the enclosing graph's data.
/// In async mode iterations are launched without waiting and joined before returning; their
/// failures are logged, not returned.
#[derive(Default)]
pub struct WhileOperator {
    predicate: Option<Predicate>,
    cluster: String,
    graph: String,
    is_async: bool,
    bus: Option<ExecuteContext>,
}

impl WhileOperator {
    pub fn builder() -> OperatorBuilder<Self> {
        OperatorBuilder::new(DEFAULT_WHILE_OPERATOR, Self::default).context(|op, bus| op.bus = bus)
    }
}

fn required_str(args: &Params, key: &str) -> Result<String> {
    args.get_str(key)
        .ok_or_else(|| anyhow!("missing string argument '{key}'"))
}

#[async_trait]
impl Operator for WhileOperator {
    fn setup(&mut self, args: &Params) -> Result<()> {
        let expr = required_str(args, EXPR_ARG)?;
        self.predicate = Some(ExprEngine::shared().compile(&expr)?);
        self.cluster = required_str(args, WHILE_CLUSTER_ARG)?;
        self.graph = required_str(args, WHILE_GRAPH_ARG)?;
        self.is_async = args.get_bool(WHILE_ASYNC_ARG).unwrap_or(false);
        Ok(())
    }

    async fn execute(&mut self, ctx: &RunContext, args: &Params) -> Result<()> {
        let Some(predicate) = &self.predicate else {
            bail!("loop driver executed before setup");
        };
        let Some(bus) = self.bus.clone() else {
            bail!("loop driver has no data bus");
        };
        let engine = ExprEngine::shared();
        let mut pending = Vec::new();
        let mut loop_idx: i64 = 0;

        let result = loop {
            if ctx.cancellation().is_cancelled() {
                break Err(anyhow!(
                    "loop over {}::{} cancelled at iteration {loop_idx}",
                    self.cluster,
                    self.graph
                ));
            }
            let scope = Params::with_parent(args);
            scope.set(LOOP_INDEX_ARG, loop_idx);
            match engine.eval(predicate, &scope, Some(&bus)) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }

            if self.is_async {
                let run = ctx.clone();
                let bus = bus.clone();
                let cluster = self.cluster.clone();
                let graph = self.graph.clone();
                pending.push(tokio::spawn(async move {
                    run.store()
                        .execute_nested(&run, &cluster, &graph, &bus, &scope)
                        .await
                }));
            } else if let Err(err) = ctx
                .store()
                .execute_nested(ctx, &self.cluster, &self.graph, &bus, &scope)
                .await
            {
                break Err(err.into());
            }
            loop_idx += 1;
        };

        for joined in join_all(pending).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(graph = %self.graph, error = %err, "async loop iteration failed")
                }
                Err(err) => {
                    tracing::warn!(graph = %self.graph, error = %err, "async loop iteration aborted")
                }
            }
        }
        tracing::debug!(
            cluster = %self.cluster,
            graph = %self.graph,
            iterations = loop_idx,
            ok = result.is_ok(),
            "loop finished"
        );
        result
    }
}
