#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dagflow_core::api::{ExecuteContext, Operator, OperatorBuilder, OperatorRegistry, Params, RunContext};
use dagflow_core::GraphStore;
use dagflow_plugins::register_builtins;

/// Publishes its `start` param as `count`.
#[derive(Default)]
pub struct Init {
    start: i64,
    count: Option<Arc<i64>>,
}

#[async_trait]
impl Operator for Init {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        self.count = Some(Arc::new(self.start));
        Ok(())
    }

    fn reset(&mut self) {
        self.start = 0;
        self.count = None;
    }
}

/// Increments `count` in place.
#[derive(Default)]
pub struct Incr {
    count: Option<Arc<i64>>,
}

#[async_trait]
impl Operator for Incr {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        let current = self.count.take().map(|c| *c).unwrap_or_default();
        self.count = Some(Arc::new(current + 1));
        Ok(())
    }

    fn reset(&mut self) {
        self.count = None;
    }
}

/// Appends the current `loopIdx` to the caller-seeded `seen` list.
#[derive(Default)]
pub struct Collect {
    idx: i64,
    bus: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Collect {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        let seen = self
            .bus
            .as_ref()
            .and_then(|bus| bus.get::<Mutex<Vec<i64>>>("seen"))
            .ok_or_else(|| anyhow::anyhow!("no 'seen' list on the bus"))?;
        seen.lock().expect("seen").push(self.idx);
        Ok(())
    }

    fn reset(&mut self) {
        self.idx = -1;
    }
}

/// Records its `tag` into the caller-seeded `trace` list.
#[derive(Default)]
pub struct Mark {
    tag: String,
    bus: Option<ExecuteContext>,
}

#[async_trait]
impl Operator for Mark {
    async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
        if let Some(trace) = self.bus.as_ref().and_then(|b| b.get::<Mutex<Vec<String>>>("trace")) {
            trace.lock().expect("trace").push(self.tag.clone());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.tag.clear();
    }
}

pub fn store() -> GraphStore {
    let mut registry = OperatorRegistry::new();
    register_builtins(&mut registry).expect("builtins");
    registry
        .register(
            OperatorBuilder::new("init", Init::default)
                .output::<i64>("count", |op| op.count.take())
                .param::<i64>("start", |op, v| op.start = v),
        )
        .expect("init");
    registry
        .register(
            OperatorBuilder::new("incr", Incr::default).in_out::<i64>(
                "count",
                |op, v| op.count = v,
                |op| op.count.take(),
            ),
        )
        .expect("incr");
    registry
        .register(
            OperatorBuilder::new("collect", Collect::default)
                .param::<i64>("loopIdx", |op, v| op.idx = v)
                .context(|op, bus| op.bus = bus),
        )
        .expect("collect");
    registry
        .register(
            OperatorBuilder::new("mark", Mark::default)
                .param::<String>("tag", |op, v| op.tag = v)
                .context(|op, bus| op.bus = bus),
        )
        .expect("mark");
    GraphStore::new(registry)
}

pub fn trace_of(bus: &ExecuteContext) -> Vec<String> {
    bus.get::<Mutex<Vec<String>>>("trace")
        .map(|t| t.lock().expect("trace").clone())
        .unwrap_or_default()
}
