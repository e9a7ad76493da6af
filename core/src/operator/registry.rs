use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::RegistryError;

use super::binding::{Detached, DynOperator, OperatorBuilder, OperatorFactory, OperatorMeta};
use super::traits::Operator;

/// One registered operator kind: its declared slots, a factory and a pool of idle instances.
pub struct OperatorEntry {
    meta: OperatorMeta,
    factory: OperatorFactory,
    idle: Mutex<Vec<Box<dyn DynOperator>>>,
}

impl OperatorEntry {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    /// Number of instances currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take an idle instance or build a fresh one. The handle returns it to the pool on drop.
    pub fn acquire(self: &Arc<Self>) -> OperatorInstance {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let op = pooled.unwrap_or_else(|| (self.factory)());
        OperatorInstance {
            entry: self.clone(),
            op,
        }
    }
}

impl fmt::Debug for OperatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorEntry")
            .field("name", &self.meta.name)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// Exclusive handle on a pooled operator instance.
pub struct OperatorInstance {
    entry: Arc<OperatorEntry>,
    op: Box<dyn DynOperator>,
}

impl OperatorInstance {
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn meta(&self) -> &OperatorMeta {
        self.entry.meta()
    }

    pub(crate) fn op(&mut self) -> &mut dyn DynOperator {
        self.op.as_mut()
    }

    pub(crate) fn parts(&mut self) -> (&OperatorMeta, &mut dyn DynOperator) {
        (self.entry.meta(), self.op.as_mut())
    }
}

impl Drop for OperatorInstance {
    fn drop(&mut self) {
        let mut op = std::mem::replace(&mut self.op, Box::new(Detached));
        op.clear_bindings();
        op.reset();
        self.entry
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }
}

/// Operator table. Filled during start-up, then moved into a `GraphStore` and only read.
#[derive(Default)]
pub struct OperatorRegistry {
    entries: HashMap<String, Arc<OperatorEntry>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Operator>(&mut self, builder: OperatorBuilder<T>) -> Result<(), RegistryError> {
        if self.entries.contains_key(builder.name()) {
            return Err(RegistryError::DuplicateName(builder.name().to_string()));
        }
        let (meta, factory, mut errors) = builder.into_parts();
        if !errors.is_empty() {
            return Err(errors.remove(0));
        }
        tracing::debug!(
            operator = %meta.name,
            inputs = meta.input.len(),
            outputs = meta.output.len(),
            params = meta.params.len(),
            "operator registered"
        );
        self.entries.insert(
            meta.name.clone(),
            Arc::new(OperatorEntry {
                meta,
                factory,
                idle: Mutex::new(Vec::new()),
            }),
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<OperatorEntry>> {
        self.entries.get(name)
    }

    pub fn meta(&self, name: &str) -> Option<&OperatorMeta> {
        self.entries.get(name).map(|e| e.meta())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON array of every operator's declared slots, sorted by name.
    pub fn dump_meta_json(&self) -> serde_json::Result<String> {
        let metas: Vec<&OperatorMeta> = self
            .names()
            .into_iter()
            .filter_map(|name| self.meta(name))
            .collect();
        serde_json::to_string_pretty(&metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::Cancellation;
    use crate::context::ExecuteContext;
    use crate::data::DataValue;
    use crate::operator::RunContext;
    use crate::params::{ParamValue, Params};
    use crate::store::GraphStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Concat {
        left: Option<Arc<String>>,
        sep: String,
        joined: Option<Arc<String>>,
        calls: u32,
        ctx: Option<ExecuteContext>,
    }

    #[async_trait]
    impl Operator for Concat {
        async fn execute(&mut self, _ctx: &RunContext, _args: &Params) -> anyhow::Result<()> {
            self.calls += 1;
            let left = self.left.as_deref().cloned().unwrap_or_default();
            self.joined = Some(Arc::new(format!("{left}{}!", self.sep)));
            Ok(())
        }

        fn reset(&mut self) {
            self.calls = 0;
            self.sep.clear();
            self.joined = None;
        }
    }

    fn concat() -> OperatorBuilder<Concat> {
        OperatorBuilder::new("concat", Concat::default)
            .input::<String>("left", |op, v| op.left = v)
            .output::<String>("joined", |op| op.joined.take())
            .param::<String>("sep", |op, v| op.sep = v)
            .context(|op, ctx| op.ctx = ctx)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = OperatorRegistry::new();
        registry.register(concat()).expect("first");
        let err = registry.register(concat()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "concat"));
    }

    #[test]
    fn test_invalid_slot_rejected() {
        let mut registry = OperatorRegistry::new();
        let builder = concat().input::<i64>("left", |_, _| {});
        assert!(matches!(
            registry.register(builder),
            Err(RegistryError::InvalidSlot { .. })
        ));
        let builder = OperatorBuilder::new("twice", Concat::default)
            .context(|_, _| {})
            .context(|_, _| {});
        assert!(registry.register(builder).is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_bound_slots_and_pool_reuse() {
        let mut registry = OperatorRegistry::new();
        registry.register(concat()).expect("register");
        let entry = registry.get("concat").expect("entry").clone();
        let store = GraphStore::new(OperatorRegistry::new());
        let ctx = RunContext::new(store, Cancellation::new(), "c", "g", Arc::from("run"));

        {
            let mut inst = entry.acquire();
            let op = inst.op();
            op.set_input(0, Some(Arc::new("hi".to_string()) as DataValue));
            assert!(op.set_param(0, &ParamValue::Str("-".into())));
            assert!(!op.set_param(0, &ParamValue::Int(1)));
            op.set_context(Some(ExecuteContext::new()));
            op.execute(&ctx, &Params::new()).await.expect("execute");
            let out = op.take_output(0).expect("output");
            assert_eq!(
                out.downcast::<String>().ok().as_deref(),
                Some(&"hi-!".to_string())
            );
        }
        assert_eq!(entry.idle_count(), 1);

        let mut inst = entry.acquire();
        assert_eq!(entry.idle_count(), 0);
        let op = inst.op();
        op.execute(&ctx, &Params::new()).await.expect("execute");
        let out = op.take_output(0).expect("output");
        assert_eq!(
            out.downcast::<String>().ok().as_deref(),
            Some(&"!".to_string())
        );
    }

    #[test]
    fn test_meta_json_lists_flags() {
        let mut registry = OperatorRegistry::new();
        registry
            .register(
                OperatorBuilder::new("flags", Concat::default)
                    .extern_input::<String>("ext", |_, _| {})
                    .aggregate::<String>("many", |_, _| {})
                    .in_out::<String>("io", |_, _| {}, |_| None),
            )
            .expect("register");
        let json = registry.dump_meta_json().expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let inputs = &parsed[0]["input"];
        assert_eq!(inputs[0]["flags"]["extern"], true);
        assert_eq!(inputs[1]["flags"]["aggregate"], true);
        assert_eq!(inputs[2]["flags"]["in_out"], true);
        assert_eq!(parsed[0]["output"][0]["name"], "io");
    }
}
