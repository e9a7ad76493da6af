//! Typed binding table between an operator's fields and the data bus.
//!
//! Each declared slot is a closure pair captured at registration time; vertices resolve slot
//! indices once at build time and the runtime only calls closures by index.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::context::ExecuteContext;
use crate::data::{DataType, DataValue};
use crate::error::RegistryError;
use crate::params::{FromParam, ParamValue, Params};
use crate::span::SpanRef;

use super::traits::{Operator, RunContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotFlags {
    #[serde(rename = "extern")]
    pub is_extern: bool,
    pub in_out: bool,
    pub aggregate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    #[serde(skip)]
    pub ty: DataType,
    pub flags: SlotFlags,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
}

/// Declared capabilities of one operator kind.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorMeta {
    pub name: String,
    pub input: Vec<SlotInfo>,
    pub output: Vec<SlotInfo>,
    pub params: Vec<ParamInfo>,
    pub context: bool,
    pub span: bool,
}

impl OperatorMeta {
    fn new(name: String) -> Self {
        Self {
            name,
            input: Vec::new(),
            output: Vec::new(),
            params: Vec::new(),
            context: false,
            span: false,
        }
    }

    pub fn input_slot(&self, field: &str) -> Option<(usize, &SlotInfo)> {
        self.input.iter().enumerate().find(|(_, s)| s.name == field)
    }

    pub fn output_slot(&self, field: &str) -> Option<(usize, &SlotInfo)> {
        self.output.iter().enumerate().find(|(_, s)| s.name == field)
    }
}

type InputSetter<T> = Box<dyn Fn(&mut T, Option<DataValue>) + Send + Sync>;
type AggregateSetter<T> = Box<dyn Fn(&mut T, HashMap<String, DataValue>) + Send + Sync>;
type OutputGetter<T> = Box<dyn Fn(&mut T) -> Option<DataValue> + Send + Sync>;
type ParamSetter<T> = Box<dyn Fn(&mut T, &ParamValue) -> bool + Send + Sync>;
type ContextSetter<T> = Box<dyn Fn(&mut T, Option<ExecuteContext>) + Send + Sync>;
type SpanSetter<T> = Box<dyn Fn(&mut T, Option<SpanRef>) + Send + Sync>;

pub(crate) type OperatorFactory = Box<dyn Fn() -> Box<dyn DynOperator> + Send + Sync>;

enum InputBinding<T> {
    Single(InputSetter<T>),
    Aggregate(AggregateSetter<T>),
}

pub(crate) struct Bindings<T> {
    inputs: Vec<InputBinding<T>>,
    outputs: Vec<OutputGetter<T>>,
    params: Vec<ParamSetter<T>>,
    context: Option<ContextSetter<T>>,
    span: Option<SpanSetter<T>>,
}

/// Registration-time description of an operator kind.
///
/// ```ignore
/// OperatorBuilder::new("concat", Concat::default)
///     .input::<String>("left", |op, v| op.left = v)
///     .output::<String>("joined", |op| op.joined.take())
///     .param::<String>("sep", |op, v| op.sep = v);
/// ```
pub struct OperatorBuilder<T: Operator> {
    pub(crate) meta: OperatorMeta,
    pub(crate) factory: Box<dyn Fn() -> T + Send + Sync>,
    pub(crate) bindings: Bindings<T>,
    pub(crate) errors: Vec<RegistryError>,
}

impl<T: Operator> OperatorBuilder<T> {
    pub fn new(name: impl Into<String>, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            meta: OperatorMeta::new(name.into()),
            factory: Box::new(factory),
            bindings: Bindings {
                inputs: Vec::new(),
                outputs: Vec::new(),
                params: Vec::new(),
                context: None,
                span: None,
            },
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    pub fn input<V: Any + Send + Sync>(
        self,
        field: impl Into<String>,
        set: impl Fn(&mut T, Option<Arc<V>>) + Send + Sync + 'static,
    ) -> Self {
        self.single_input::<V>(field.into(), SlotFlags::default(), set)
    }

    /// Input supplied from outside the graph (caller-seeded or ancestor bus); no producer needed.
    pub fn extern_input<V: Any + Send + Sync>(
        self,
        field: impl Into<String>,
        set: impl Fn(&mut T, Option<Arc<V>>) + Send + Sync + 'static,
    ) -> Self {
        let flags = SlotFlags {
            is_extern: true,
            ..SlotFlags::default()
        };
        self.single_input::<V>(field.into(), flags, set)
    }

    /// Gathers several independently named upstream values into one name-keyed map.
    pub fn aggregate<V: Any + Send + Sync>(
        mut self,
        field: impl Into<String>,
        set: impl Fn(&mut T, HashMap<String, Arc<V>>) + Send + Sync + 'static,
    ) -> Self {
        let field = field.into();
        let flags = SlotFlags {
            aggregate: true,
            ..SlotFlags::default()
        };
        if !self.push_input_info::<V>(&field, flags) {
            return self;
        }
        self.bindings
            .inputs
            .push(InputBinding::Aggregate(Box::new(move |op, values| {
                let typed = values
                    .into_iter()
                    .filter_map(|(k, v)| v.downcast::<V>().ok().map(|v| (k, v)))
                    .collect();
                set(op, typed);
            })));
        self
    }

    pub fn output<V: Any + Send + Sync>(
        self,
        field: impl Into<String>,
        get: impl Fn(&mut T) -> Option<Arc<V>> + Send + Sync + 'static,
    ) -> Self {
        self.single_output::<V>(field.into(), SlotFlags::default(), get)
    }

    /// Consumed and republished under the same data id. The producer's slot is moved out.
    pub fn in_out<V: Any + Send + Sync>(
        self,
        field: impl Into<String>,
        set: impl Fn(&mut T, Option<Arc<V>>) + Send + Sync + 'static,
        get: impl Fn(&mut T) -> Option<Arc<V>> + Send + Sync + 'static,
    ) -> Self {
        let field = field.into();
        let flags = SlotFlags {
            in_out: true,
            ..SlotFlags::default()
        };
        self.single_input::<V>(field.clone(), flags, set)
            .single_output::<V>(field, flags, get)
    }

    pub fn param<V: FromParam + 'static>(
        mut self,
        field: impl Into<String>,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        let field = field.into();
        if self.meta.params.iter().any(|p| p.name == field) {
            self.reject(&field, "param declared twice");
            return self;
        }
        self.meta.params.push(ParamInfo {
            name: field,
            type_name: std::any::type_name::<V>(),
        });
        self.bindings
            .params
            .push(Box::new(move |op, value| match V::from_param(value) {
                Some(v) => {
                    set(op, v);
                    true
                }
                None => false,
            }));
        self
    }

    pub fn context(
        mut self,
        set: impl Fn(&mut T, Option<ExecuteContext>) + Send + Sync + 'static,
    ) -> Self {
        if self.meta.context {
            self.reject("context", "context slot declared twice");
            return self;
        }
        self.meta.context = true;
        self.bindings.context = Some(Box::new(set));
        self
    }

    pub fn span(mut self, set: impl Fn(&mut T, Option<SpanRef>) + Send + Sync + 'static) -> Self {
        if self.meta.span {
            self.reject("span", "span slot declared twice");
            return self;
        }
        self.meta.span = true;
        self.bindings.span = Some(Box::new(set));
        self
    }

    pub(crate) fn into_parts(self) -> (OperatorMeta, OperatorFactory, Vec<RegistryError>) {
        let bindings = Arc::new(self.bindings);
        let factory = self.factory;
        let make: OperatorFactory = Box::new(move || {
            Box::new(Bound {
                op: factory(),
                bindings: bindings.clone(),
            }) as Box<dyn DynOperator>
        });
        (self.meta, make, self.errors)
    }

    fn single_input<V: Any + Send + Sync>(
        mut self,
        field: String,
        flags: SlotFlags,
        set: impl Fn(&mut T, Option<Arc<V>>) + Send + Sync + 'static,
    ) -> Self {
        if !self.push_input_info::<V>(&field, flags) {
            return self;
        }
        self.bindings
            .inputs
            .push(InputBinding::Single(Box::new(move |op, value| {
                set(op, value.and_then(|v| v.downcast::<V>().ok()));
            })));
        self
    }

    fn single_output<V: Any + Send + Sync>(
        mut self,
        field: String,
        flags: SlotFlags,
        get: impl Fn(&mut T) -> Option<Arc<V>> + Send + Sync + 'static,
    ) -> Self {
        if self.meta.output.iter().any(|s| s.name == field) {
            self.reject(&field, "output declared twice");
            return self;
        }
        self.meta.output.push(SlotInfo {
            name: field,
            type_name: std::any::type_name::<V>(),
            ty: DataType::of::<V>(),
            flags,
        });
        self.bindings
            .outputs
            .push(Box::new(move |op| get(op).map(|v| v as DataValue)));
        self
    }

    fn push_input_info<V: Any>(&mut self, field: &str, flags: SlotFlags) -> bool {
        if self.meta.input.iter().any(|s| s.name == field) {
            self.reject(field, "input declared twice");
            return false;
        }
        self.meta.input.push(SlotInfo {
            name: field.to_string(),
            type_name: std::any::type_name::<V>(),
            ty: DataType::of::<V>(),
            flags,
        });
        true
    }

    fn reject(&mut self, field: &str, reason: &'static str) {
        self.errors.push(RegistryError::InvalidSlot {
            operator: self.meta.name.clone(),
            field: field.to_string(),
            reason,
        });
    }
}

/// Object-safe view of a bound operator instance used by the runtime.
pub(crate) trait DynOperator: Send {
    fn setup(&mut self, args: &Params) -> anyhow::Result<()>;
    fn execute<'a>(
        &'a mut self,
        ctx: &'a RunContext,
        args: &'a Params,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
    fn reset(&mut self);
    fn set_input(&mut self, slot: usize, value: Option<DataValue>);
    fn set_aggregate(&mut self, slot: usize, values: HashMap<String, DataValue>);
    fn take_output(&mut self, slot: usize) -> Option<DataValue>;
    fn set_param(&mut self, slot: usize, value: &ParamValue) -> bool;
    fn set_context(&mut self, ctx: Option<ExecuteContext>);
    fn set_span(&mut self, span: Option<SpanRef>);
    fn clear_bindings(&mut self);
}

pub(crate) struct Bound<T: Operator> {
    pub(crate) op: T,
    pub(crate) bindings: Arc<Bindings<T>>,
}

impl<T: Operator> DynOperator for Bound<T> {
    fn setup(&mut self, args: &Params) -> anyhow::Result<()> {
        self.op.setup(args)
    }

    fn execute<'a>(
        &'a mut self,
        ctx: &'a RunContext,
        args: &'a Params,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.op.execute(ctx, args)
    }

    fn reset(&mut self) {
        self.op.reset();
    }

    fn set_input(&mut self, slot: usize, value: Option<DataValue>) {
        if let Some(InputBinding::Single(set)) = self.bindings.inputs.get(slot) {
            set(&mut self.op, value);
        }
    }

    fn set_aggregate(&mut self, slot: usize, values: HashMap<String, DataValue>) {
        if let Some(InputBinding::Aggregate(set)) = self.bindings.inputs.get(slot) {
            set(&mut self.op, values);
        }
    }

    fn take_output(&mut self, slot: usize) -> Option<DataValue> {
        self.bindings
            .outputs
            .get(slot)
            .and_then(|get| get(&mut self.op))
    }

    fn set_param(&mut self, slot: usize, value: &ParamValue) -> bool {
        match self.bindings.params.get(slot) {
            Some(set) => set(&mut self.op, value),
            None => false,
        }
    }

    fn set_context(&mut self, ctx: Option<ExecuteContext>) {
        if let Some(set) = &self.bindings.context {
            set(&mut self.op, ctx);
        }
    }

    fn set_span(&mut self, span: Option<SpanRef>) {
        if let Some(set) = &self.bindings.span {
            set(&mut self.op, span);
        }
    }

    fn clear_bindings(&mut self) {
        for binding in &self.bindings.inputs {
            match binding {
                InputBinding::Single(set) => set(&mut self.op, None),
                InputBinding::Aggregate(set) => set(&mut self.op, HashMap::new()),
            }
        }
        self.set_context(None);
        self.set_span(None);
    }
}

/// Placeholder left in a released instance handle.
pub(crate) struct Detached;

impl DynOperator for Detached {
    fn setup(&mut self, _args: &Params) -> anyhow::Result<()> {
        Ok(())
    }

    fn execute<'a>(
        &'a mut self,
        _ctx: &'a RunContext,
        _args: &'a Params,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("operator instance already released")) })
    }

    fn reset(&mut self) {}
    fn set_input(&mut self, _slot: usize, _value: Option<DataValue>) {}
    fn set_aggregate(&mut self, _slot: usize, _values: HashMap<String, DataValue>) {}
    fn take_output(&mut self, _slot: usize) -> Option<DataValue> {
        None
    }
    fn set_param(&mut self, _slot: usize, _value: &ParamValue) -> bool {
        false
    }
    fn set_context(&mut self, _ctx: Option<ExecuteContext>) {}
    fn set_span(&mut self, _span: Option<SpanRef>) {}
    fn clear_bindings(&mut self) {}
}
