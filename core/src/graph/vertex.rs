use std::collections::HashMap;

use serde::Serialize;

use crate::data::DataId;
use crate::params::ParamValue;

/// Result a dependency edge requires from its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    Ok,
    Err,
    Any,
}

/// Guard attached to a vertex or a conditional argument branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Lookup of a boolean config setting, optionally negated.
    Config { name: String, negate: bool },
    /// Predicate compiled by the cluster's expression operator.
    Expr(String),
}

impl Guard {
    /// A bare identifier (letters, digits, `_`, optional leading `!`) is a config-setting
    /// reference; anything else is an expression.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if Self::is_expr(s) {
            return Self::Expr(s.to_string());
        }
        match s.strip_prefix('!') {
            Some(name) => Self::Config {
                name: name.to_string(),
                negate: true,
            },
            None => Self::Config {
                name: s.to_string(),
                negate: false,
            },
        }
    }

    pub fn is_expr(s: &str) -> bool {
        s.chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '!'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexKind {
    Operator,
    /// Predicate gate (`cond`).
    Gate,
    /// Loop driver (`while`).
    Loop,
    SubGraph,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTarget {
    pub cluster: String,
    pub graph: String,
}

#[derive(Debug, Clone)]
pub struct SelectArgs {
    pub guard: Guard,
    pub args: HashMap<String, ParamValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub vertex: usize,
    pub expect: Expect,
}

/// An operator input slot resolved to bus ids. Aggregate inputs carry one id per gathered name.
#[derive(Debug, Clone)]
pub struct InputBinding {
    pub field: String,
    pub slot: usize,
    pub ids: Vec<DataId>,
    pub aggregate: bool,
    pub required: bool,
    pub is_move: bool,
    pub is_extern: bool,
    pub in_out: bool,
}

#[derive(Debug, Clone)]
pub struct OutputBinding {
    pub field: String,
    pub slot: usize,
    pub id: DataId,
}

/// A built vertex. Immutable once its graph is built.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub(crate) id: String,
    pub(crate) index: usize,
    pub(crate) kind: VertexKind,
    pub(crate) id_generated: bool,
    pub(crate) operator: Option<String>,
    pub(crate) label: Option<String>,
    pub(crate) target: Option<GraphTarget>,
    pub(crate) child_idx: Option<usize>,
    pub(crate) guard: Option<Guard>,
    pub(crate) select_args: Vec<SelectArgs>,
    pub(crate) args: HashMap<String, ParamValue>,
    pub(crate) inputs: Vec<InputBinding>,
    pub(crate) outputs: Vec<OutputBinding>,
    pub(crate) deps: Vec<Dependency>,
    pub(crate) dep_slots: HashMap<usize, usize>,
    pub(crate) successors: Vec<usize>,
    pub(crate) start: bool,
    pub(crate) is_async: bool,
}

impl Vertex {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn target(&self) -> Option<&GraphTarget> {
        self.target.as_ref()
    }

    /// Position among the owning graph's sub-graph calls; used to wire the child bus.
    pub fn child_idx(&self) -> Option<usize> {
        self.child_idx
    }

    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    pub fn select_args(&self) -> &[SelectArgs] {
        &self.select_args
    }

    pub fn args(&self) -> &HashMap<String, ParamValue> {
        &self.args
    }

    pub fn inputs(&self) -> &[InputBinding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }

    /// Slot index of `producer` in this vertex's dependency results.
    pub fn dep_slot(&self, producer: usize) -> Option<usize> {
        self.dep_slots.get(&producer).copied()
    }

    pub fn successors(&self) -> &[usize] {
        &self.successors
    }

    pub fn is_start(&self) -> bool {
        self.start
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Human readable label: explicit id, else the gate expression or operator name.
    pub fn label(&self) -> &str {
        if !self.id_generated {
            return &self.id;
        }
        self.label
            .as_deref()
            .or(self.operator.as_deref())
            .unwrap_or(&self.id)
    }

    pub(crate) fn depend_on(&mut self, producer: usize, expect: Expect) -> bool {
        if self.dep_slots.contains_key(&producer) {
            return false;
        }
        self.dep_slots.insert(producer, self.deps.len());
        self.deps.push(Dependency {
            vertex: producer,
            expect,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_guard_parse() {
        assert_eq!(
            Guard::parse("flag"),
            Guard::Config {
                name: "flag".into(),
                negate: false
            }
        );
        assert_eq!(
            Guard::parse("!flag"),
            Guard::Config {
                name: "flag".into(),
                negate: true
            }
        );
        assert_eq!(Guard::parse("a && b"), Guard::Expr("a && b".into()));
        assert_eq!(
            Guard::parse("ARGS.x == 1"),
            Guard::Expr("ARGS.x == 1".into())
        );
    }
}
