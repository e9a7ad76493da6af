#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dagflow_core::api::{
    Cancellation, DataId, ExecuteContext, ExecuteError, Operator, OperatorBuilder,
    OperatorRegistry, ParamValue, Params, RunContext, EXPR_ARG,
};
use dagflow_core::GraphStore;

/// Shared log seeded on the caller bus; every test operator appends its `tag`.
pub type Trace = Mutex<Vec<String>>;

fn record(ctx: &Option<ExecuteContext>, tag: &str) {
    if let Some(trace) = ctx.as_ref().and_then(|c| c.get::<Trace>("trace")) {
        trace.lock().expect("trace").push(tag.to_string());
    }
}

/// Publishes its `text` param as `value`.
#[derive(Default)]
pub struct Emit {
    tag: String,
    text: String,
    value: Option<Arc<String>>,
    ctx: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Emit {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        record(&self.ctx, &self.tag);
        self.value = Some(Arc::new(self.text.clone()));
        Ok(())
    }

    fn reset(&mut self) {
        self.tag.clear();
        self.text.clear();
        self.value = None;
    }
}

/// Appends `suffix` to `value` in place.
#[derive(Default)]
pub struct Append {
    tag: String,
    suffix: String,
    value: Option<Arc<String>>,
    ctx: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Append {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        record(&self.ctx, &self.tag);
        let current = self.value.take().map(|v| v.to_string()).unwrap_or_default();
        self.value = Some(Arc::new(format!("{current}{}", self.suffix)));
        Ok(())
    }

    fn reset(&mut self) {
        self.tag.clear();
        self.suffix.clear();
        self.value = None;
    }
}

/// Copies an externally supplied `value` to `echoed`.
#[derive(Default)]
pub struct Echo {
    tag: String,
    value: Option<Arc<String>>,
    echoed: Option<Arc<String>>,
    ctx: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Echo {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        record(&self.ctx, &self.tag);
        let Some(value) = self.value.take() else {
            anyhow::bail!("no value to echo");
        };
        self.echoed = Some(value);
        Ok(())
    }

    fn reset(&mut self) {
        self.tag.clear();
        self.value = None;
        self.echoed = None;
    }
}

/// Joins every aggregated part, ordered by data name.
#[derive(Default)]
pub struct Gather {
    parts: HashMap<String, Arc<String>>,
    joined: Option<Arc<String>>,
}

#[async_trait]
impl Operator for Gather {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        let mut names: Vec<&String> = self.parts.keys().collect();
        names.sort();
        let joined: Vec<&str> = names.iter().map(|n| self.parts[*n].as_str()).collect();
        self.joined = Some(Arc::new(joined.join(",")));
        Ok(())
    }

    fn reset(&mut self) {
        self.parts.clear();
        self.joined = None;
    }
}

#[derive(Default)]
pub struct Mark {
    tag: String,
    ctx: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Mark {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        record(&self.ctx, &self.tag);
        Ok(())
    }

    fn reset(&mut self) {
        self.tag.clear();
    }
}

#[derive(Default)]
pub struct Fail {
    tag: String,
    ctx: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Fail {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        record(&self.ctx, &self.tag);
        anyhow::bail!("{} failed on purpose", self.tag)
    }

    fn reset(&mut self) {
        self.tag.clear();
    }
}

#[derive(Default)]
pub struct Boom;

#[async_trait]
impl Operator for Boom {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        panic!("boom");
    }
}

/// Succeeds in `execute`; the faults live in its slot bindings, registered per name below.
#[derive(Default)]
pub struct Brittle {
    value: Option<Arc<String>>,
    reset_panics: bool,
}

#[async_trait]
impl Operator for Brittle {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        if self.reset_panics {
            panic!("reset");
        }
    }
}

/// Minimal predicate operator: the expression names one boolean argument, `ARGS.` prefix and
/// a leading `!` allowed. Missing or non-boolean arguments read as false.
#[derive(Default)]
pub struct FlagExpr {
    key: String,
    negate: bool,
}

#[async_trait]
impl Operator for FlagExpr {
    fn setup(&mut self, args: &Params) -> anyhow::Result<()> {
        let expr = args
            .get_str(EXPR_ARG)
            .ok_or_else(|| anyhow::anyhow!("missing {EXPR_ARG}"))?;
        let expr = expr.trim();
        self.negate = expr.starts_with('!');
        self.key = expr
            .trim_start_matches('!')
            .trim_start_matches("ARGS.")
            .to_string();
        Ok(())
    }

    async fn execute(&mut self, _ctx: &RunContext, args: &Params) -> anyhow::Result<()> {
        let value = args.get_bool(&self.key).unwrap_or(false);
        if value != self.negate {
            Ok(())
        } else {
            anyhow::bail!("{} is false", self.key)
        }
    }
}

pub fn registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry
        .register(
            OperatorBuilder::new("emit", Emit::default)
                .output::<String>("value", |op| op.value.take())
                .param::<String>("text", |op, v| op.text = v)
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, ctx| op.ctx = ctx),
        )
        .expect("emit");
    registry
        .register(
            OperatorBuilder::new("append", Append::default)
                .in_out::<String>("value", |op, v| op.value = v, |op| op.value.take())
                .param::<String>("suffix", |op, v| op.suffix = v)
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, ctx| op.ctx = ctx),
        )
        .expect("append");
    registry
        .register(
            OperatorBuilder::new("echo", Echo::default)
                .extern_input::<String>("value", |op, v| op.value = v)
                .output::<String>("echoed", |op| op.echoed.take())
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, ctx| op.ctx = ctx),
        )
        .expect("echo");
    registry
        .register(
            OperatorBuilder::new("gather", Gather::default)
                .aggregate::<String>("parts", |op, v| op.parts = v)
                .output::<String>("joined", |op| op.joined.take()),
        )
        .expect("gather");
    registry
        .register(
            OperatorBuilder::new("mark", Mark::default)
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, ctx| op.ctx = ctx),
        )
        .expect("mark");
    registry
        .register(
            OperatorBuilder::new("fail", Fail::default)
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, ctx| op.ctx = ctx),
        )
        .expect("fail");
    registry
        .register(OperatorBuilder::new("boom", || Boom))
        .expect("boom");
    registry
        .register(
            OperatorBuilder::new("bad_output", Brittle::default)
                .output::<String>("out", |_op| panic!("output getter")),
        )
        .expect("bad_output");
    registry
        .register(OperatorBuilder::new("bad_input", Brittle::default).input::<String>(
            "value",
            |op, v| {
                if v.is_some() {
                    panic!("input setter");
                }
                op.value = v;
            },
        ))
        .expect("bad_input");
    registry
        .register(
            OperatorBuilder::new("bad_param", Brittle::default)
                .param::<String>("tag", |_op, _v| panic!("param setter")),
        )
        .expect("bad_param");
    registry
        .register(OperatorBuilder::new("bad_context", Brittle::default).context(|_op, ctx| {
            if ctx.is_some() {
                panic!("context setter");
            }
        }))
        .expect("bad_context");
    registry
        .register(OperatorBuilder::new("bad_reset", || Brittle {
            reset_panics: true,
            ..Brittle::default()
        }))
        .expect("bad_reset");
    registry
        .register(OperatorBuilder::new("dagflow_expr", FlagExpr::default))
        .expect("expr");
    registry
}

/// Route engine logs to the test harness; `RUST_LOG=dagflow_core=debug` shows them.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn store() -> GraphStore {
    init_logs();
    GraphStore::new(registry())
}

pub fn params(pairs: &[(&str, ParamValue)]) -> Params {
    let params = Params::new();
    for (k, v) in pairs {
        params.set(*k, v.clone());
    }
    params
}

/// Outcome of one graph invocation as seen by the caller.
pub struct RunOutput {
    pub result: Result<(), ExecuteError>,
    pub bus: ExecuteContext,
    pub trace: Vec<String>,
}

impl RunOutput {
    pub fn string(&self, name: &str) -> Option<String> {
        self.bus.get::<String>(name).map(|v| v.to_string())
    }

    pub fn sorted_trace(&self) -> Vec<String> {
        let mut trace = self.trace.clone();
        trace.sort();
        trace
    }
}

/// Run `graph`, reserving `outputs` (as `String` data) on the caller bus beforehand.
pub async fn run(
    store: &GraphStore,
    cluster: &str,
    graph: &str,
    params: &Params,
    outputs: &[&str],
) -> RunOutput {
    let bus = ExecuteContext::new();
    bus.insert("trace", Trace::default());
    for name in outputs {
        bus.fill_entry(&DataId::of::<String>(*name));
    }
    let result = store
        .execute_graph(&Cancellation::new(), cluster, graph, &bus, params)
        .await;
    let trace = bus
        .get::<Trace>("trace")
        .map(|t| t.lock().expect("trace").clone())
        .unwrap_or_default();
    RunOutput { result, bus, trace }
}
