use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use dagflow_core::api::{
    ExecuteContext, Operator, OperatorBuilder, Params, RunContext, DEFAULT_EXPR_OPERATOR, EXPR_ARG,
};

use crate::expr::{ExprEngine, Predicate};

/// Gate operator: `Ok` when the predicate holds, `Err` otherwise.
///
/// Also evaluates `expect` guards, conditional `select_args` and config settings.
#[derive(Default)]
pub struct ExprOperator {
    predicate: Option<Predicate>,
    bus: Option<ExecuteContext>,
}

impl ExprOperator {
    pub fn builder() -> OperatorBuilder<Self> {
        OperatorBuilder::new(DEFAULT_EXPR_OPERATOR, Self::default).context(|op, bus| op.bus = bus)
    }
}

#[async_trait]
impl Operator for ExprOperator {
    fn setup(&mut self, args: &Params) -> Result<()> {
        let expr = args
            .get_str(EXPR_ARG)
            .ok_or_else(|| anyhow!("missing string argument '{EXPR_ARG}'"))?;
        self.predicate = Some(ExprEngine::shared().compile(&expr)?);
        Ok(())
    }

    async fn execute(&mut self, _ctx: &RunContext, args: &Params) -> Result<()> {
        let Some(predicate) = &self.predicate else {
            bail!("expression operator executed before setup");
        };
        if ExprEngine::shared().eval(predicate, args, self.bus.as_ref())? {
            Ok(())
        } else {
            bail!("'{}' is false", predicate.source())
        }
    }
}
