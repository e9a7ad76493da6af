use std::fmt;

use anyhow::anyhow;
use lazy_static::lazy_static;
use rhai::{Engine, Scope, AST};

use dagflow_core::context::ExecuteContext;
use dagflow_core::params::Params;

use super::selectors::{to_dynamic, ArgsSelector, VarsSelector};

lazy_static! {
    static ref SHARED: ExprEngine = ExprEngine::new();
}

/// A compiled predicate. Compile once at operator setup, evaluate per run.
#[derive(Clone)]
pub struct Predicate {
    source: String,
    ast: AST,
}

impl Predicate {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.source).finish()
    }
}

pub struct ExprEngine {
    engine: Engine,
}

impl Default for ExprEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(64, 32);
        engine.set_max_call_levels(16);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(64 * 1024);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);

        engine
            .register_type_with_name::<ArgsSelector>("Args")
            .register_indexer_get(ArgsSelector::get);
        engine
            .register_type_with_name::<VarsSelector>("Vars")
            .register_indexer_get(VarsSelector::get);
        Self { engine }
    }

    /// Engine shared by the built-in operators.
    pub fn shared() -> &'static ExprEngine {
        &SHARED
    }

    pub fn compile(&self, expr: &str) -> anyhow::Result<Predicate> {
        let ast = self
            .engine
            .compile_expression(expr)
            .map_err(|e| anyhow!("invalid expression '{expr}': {e}"))?;
        Ok(Predicate {
            source: expr.to_string(),
            ast,
        })
    }

    /// Evaluate to a boolean. A non-boolean result is an error.
    pub fn eval(
        &self,
        predicate: &Predicate,
        args: &Params,
        vars: Option<&ExecuteContext>,
    ) -> anyhow::Result<bool> {
        let mut scope = Scope::new();
        for (name, value) in args.flatten() {
            scope.push_dynamic(name, to_dynamic(&value));
        }
        scope.push("ARGS", ArgsSelector::new(args.clone()));
        scope.push("VARS", VarsSelector::new(vars.cloned()));

        self.engine
            .eval_ast_with_scope::<bool>(&mut scope, &predicate.ast)
            .map_err(|e| anyhow!("expression '{}' failed: {e}", predicate.source))
    }
}
