use async_trait::async_trait;

use dagflow_core::api::{Operator, OperatorBuilder, Params, RunContext};

pub const NOOP_OPERATOR: &str = "noop";

/// Does nothing and succeeds. Useful as a join point or placeholder.
#[derive(Default)]
pub struct NoopOperator;

impl NoopOperator {
    pub fn builder() -> OperatorBuilder<Self> {
        OperatorBuilder::new(NOOP_OPERATOR, Self::default)
    }
}

#[async_trait]
impl Operator for NoopOperator {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        Ok(())
    }
}
