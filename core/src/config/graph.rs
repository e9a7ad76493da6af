//! Declarative cluster document: `[[graph]]` tables of `[[graph.vertex]]` entries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::params::ParamValue;

pub const DEFAULT_EXPR_OPERATOR: &str = "dagflow_expr";
pub const DEFAULT_WHILE_OPERATOR: &str = "dagflow_while";

/// Binding of an operator field to a bus name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDataDef {
    /// Bus name; defaults to `field`.
    #[serde(default)]
    pub id: String,
    pub field: String,
    /// Upstream names gathered by an aggregate input.
    #[serde(default)]
    pub aggregate: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "move")]
    pub is_move: bool,
    #[serde(default, rename = "extern")]
    pub is_extern: bool,
}

impl GraphDataDef {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn external(mut self) -> Self {
        self.is_extern = true;
        self
    }

    pub fn aggregate<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregate = names.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectArgsDef {
    #[serde(rename = "match")]
    pub match_expr: String,
    #[serde(default)]
    pub args: HashMap<String, ParamValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexDef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub processor: String,
    #[serde(default, rename = "while")]
    pub while_expr: String,
    #[serde(default)]
    pub cond: String,
    #[serde(default)]
    pub expect: String,
    #[serde(default)]
    pub expect_config: String,
    #[serde(default)]
    pub select_args: Vec<SelectArgsDef>,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub graph: String,
    #[serde(default)]
    pub successor: Vec<String>,
    #[serde(default, rename = "if")]
    pub if_successor: Vec<String>,
    #[serde(default, rename = "else")]
    pub else_successor: Vec<String>,
    #[serde(default)]
    pub successor_on_ok: Vec<String>,
    #[serde(default)]
    pub successor_on_err: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub deps_on_ok: Vec<String>,
    #[serde(default)]
    pub deps_on_err: Vec<String>,
    #[serde(default)]
    pub input: Vec<GraphDataDef>,
    #[serde(default)]
    pub output: Vec<GraphDataDef>,
    #[serde(default)]
    pub start: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub args: HashMap<String, ParamValue>,
}

impl VertexDef {
    pub fn operator(name: impl Into<String>) -> Self {
        Self {
            processor: name.into(),
            ..Self::default()
        }
    }

    pub fn cond(expr: impl Into<String>) -> Self {
        Self {
            cond: expr.into(),
            ..Self::default()
        }
    }

    /// Sub-graph call; an empty `cluster` targets the owning cluster.
    pub fn subgraph(cluster: impl Into<String>, graph: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            graph: graph.into(),
            ..Self::default()
        }
    }

    /// Loop driver running `graph` while `expr` holds.
    pub fn looping(expr: impl Into<String>, cluster: impl Into<String>, graph: impl Into<String>) -> Self {
        Self {
            while_expr: expr.into(),
            ..Self::subgraph(cluster, graph)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn start(mut self) -> Self {
        self.start = true;
        self
    }

    pub fn async_loop(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn expect(mut self, expr: impl Into<String>) -> Self {
        self.expect = expr.into();
        self
    }

    pub fn expect_config(mut self, name: impl Into<String>) -> Self {
        self.expect_config = name.into();
        self
    }

    pub fn deps<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn deps_on_ok<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps_on_ok.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn deps_on_err<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps_on_err.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn successor<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.successor.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn on_ok<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.successor_on_ok.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn on_err<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.successor_on_err.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, data: GraphDataDef) -> Self {
        self.input.push(data);
        self
    }

    pub fn output(mut self, data: GraphDataDef) -> Self {
        self.output.push(data);
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn select(mut self, match_expr: impl Into<String>, args: HashMap<String, ParamValue>) -> Self {
        self.select_args.push(SelectArgsDef {
            match_expr: match_expr.into(),
            args,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub name: String,
    #[serde(default)]
    pub vertex: Vec<VertexDef>,
    #[serde(default)]
    pub expect_version: String,
    #[serde(default)]
    pub priority: i32,
    /// When false, a skipped vertex propagates Skip instead of Err to its dependents.
    #[serde(default = "default_true")]
    pub vertex_skip_as_error: bool,
}

fn default_true() -> bool {
    true
}

impl GraphDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: Vec::new(),
            expect_version: String::new(),
            priority: 0,
            vertex_skip_as_error: true,
        }
    }

    pub fn vertex(mut self, vertex: VertexDef) -> Self {
        self.vertex.push(vertex);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSettingDef {
    pub name: String,
    pub cond: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDef {
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub strict_dsl: bool,
    #[serde(default = "default_expr_operator")]
    pub default_expr_processor: String,
    #[serde(default = "default_while_operator")]
    pub default_while_processor: String,
    #[serde(default = "default_context_pool_size")]
    pub default_context_pool_size: usize,
    #[serde(default)]
    pub graph: Vec<GraphDef>,
    #[serde(default)]
    pub config_setting: Vec<ConfigSettingDef>,
}

fn default_expr_operator() -> String {
    DEFAULT_EXPR_OPERATOR.to_string()
}

fn default_while_operator() -> String {
    DEFAULT_WHILE_OPERATOR.to_string()
}

fn default_context_pool_size() -> usize {
    1
}

impl Default for ClusterDef {
    fn default() -> Self {
        Self {
            desc: String::new(),
            strict_dsl: false,
            default_expr_processor: default_expr_operator(),
            default_while_processor: default_while_operator(),
            default_context_pool_size: default_context_pool_size(),
            graph: Vec::new(),
            config_setting: Vec::new(),
        }
    }
}

impl ClusterDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.strict_dsl = true;
        self
    }

    pub fn graph(mut self, graph: GraphDef) -> Self {
        self.graph.push(graph);
        self
    }

    pub fn config_setting(mut self, name: impl Into<String>, cond: impl Into<String>) -> Self {
        self.config_setting.push(ConfigSettingDef {
            name: name.into(),
            cond: cond.into(),
        });
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.default_context_pool_size = size;
        self
    }
}
