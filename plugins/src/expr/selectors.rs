use rhai::{Dynamic, ImmutableString};

use dagflow_core::context::ExecuteContext;
use dagflow_core::params::{ParamValue, Params};

/// `ARGS` inside a predicate.
#[derive(Clone)]
pub(crate) struct ArgsSelector {
    args: Params,
}

impl ArgsSelector {
    pub(crate) fn new(args: Params) -> Self {
        Self { args }
    }

    pub(crate) fn get(&mut self, key: ImmutableString) -> Dynamic {
        self.args
            .get(key.as_str())
            .map(|v| to_dynamic(&v))
            .unwrap_or(Dynamic::FALSE)
    }
}

/// `VARS` inside a predicate: typed reads from the data bus of the running graph.
#[derive(Clone)]
pub(crate) struct VarsSelector {
    bus: Option<ExecuteContext>,
}

impl VarsSelector {
    pub(crate) fn new(bus: Option<ExecuteContext>) -> Self {
        Self { bus }
    }

    pub(crate) fn get(&mut self, key: ImmutableString) -> Dynamic {
        let Some(bus) = &self.bus else {
            return Dynamic::FALSE;
        };
        let key = key.as_str();
        if let Some(v) = bus.get::<bool>(key) {
            return Dynamic::from_bool(*v);
        }
        if let Some(v) = bus.get::<String>(key) {
            return Dynamic::from(v.as_str().to_string());
        }
        if let Some(v) = bus.get::<i64>(key) {
            return Dynamic::from_int(*v);
        }
        if let Some(v) = bus.get::<i32>(key) {
            return Dynamic::from_int(i64::from(*v));
        }
        if let Some(v) = bus.get::<f64>(key) {
            return Dynamic::from_float(*v);
        }
        if let Some(v) = bus.get::<f32>(key) {
            return Dynamic::from_float(f64::from(*v));
        }
        Dynamic::FALSE
    }
}

pub(crate) fn to_dynamic(value: &ParamValue) -> Dynamic {
    match value {
        ParamValue::Bool(b) => Dynamic::from_bool(*b),
        ParamValue::Int(i) => Dynamic::from_int(*i),
        ParamValue::Float(f) => Dynamic::from_float(*f),
        ParamValue::Str(s) => Dynamic::from(s.clone()),
        ParamValue::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        ParamValue::Table(map) => Dynamic::from_map(
            map.iter()
                .map(|(k, v)| (k.as_str().into(), to_dynamic(v)))
                .collect(),
        ),
    }
}
