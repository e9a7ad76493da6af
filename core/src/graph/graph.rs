use std::collections::{HashMap, HashSet};

use crate::config::{GraphDataDef, GraphDef, VertexDef};
use crate::data::DataId;
use crate::error::BuildError;
use crate::operator::{OperatorMeta, OperatorRegistry};
use crate::params::ParamValue;

use super::vertex::{
    Expect, GraphTarget, Guard, InputBinding, OutputBinding, SelectArgs, Vertex, VertexKind,
};
use super::{EXPR_ARG, WHILE_ASYNC_ARG, WHILE_CLUSTER_ARG, WHILE_GRAPH_ARG};

/// Cluster-level facts a graph needs while building.
pub(crate) struct BuildScope<'a> {
    pub cluster: &'a str,
    pub strict: bool,
    pub expr_operator: &'a str,
    pub while_operator: &'a str,
    pub config_settings: &'a HashSet<String>,
    pub registry: &'a OperatorRegistry,
}

impl BuildScope<'_> {
    fn has_setting(&self, name: &str) -> bool {
        let name = name.strip_prefix('!').unwrap_or(name);
        self.config_settings.contains(name)
    }

    fn meta(&self, operator: &str) -> Result<&OperatorMeta, BuildError> {
        self.registry
            .meta(operator)
            .ok_or_else(|| BuildError::OperatorNotFound(operator.to_string()))
    }
}

/// A validated, fully linked DAG.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) cluster: String,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) data_mapping: HashMap<DataId, usize>,
    pub(crate) outputs: Vec<DataId>,
    pub(crate) subgraph_count: usize,
    pub(crate) expect_version: String,
    pub(crate) priority: i32,
    pub(crate) skip_as_error: bool,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `cluster::graph`, used in logs and events.
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.cluster, self.name)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.index.get(id).map(|&i| &self.vertices[i])
    }

    /// Vertex producing `id`, if any.
    pub fn producer(&self, id: &DataId) -> Option<&Vertex> {
        self.data_mapping.get(id).map(|&i| &self.vertices[i])
    }

    /// Every data id this graph's vertices publish; reserved on the bus before each run.
    pub fn outputs(&self) -> &[DataId] {
        &self.outputs
    }

    pub fn subgraph_count(&self) -> usize {
        self.subgraph_count
    }

    pub fn expect_version(&self) -> &str {
        &self.expect_version
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn skip_as_error(&self) -> bool {
        self.skip_as_error
    }

    pub(crate) fn build(def: &GraphDef, scope: &BuildScope<'_>) -> Result<Self, BuildError> {
        if def.vertex.is_empty() {
            return Err(BuildError::EmptyGraph(def.name.clone()));
        }
        let mut graph = Graph {
            name: def.name.clone(),
            cluster: scope.cluster.to_string(),
            vertices: Vec::with_capacity(def.vertex.len()),
            index: HashMap::new(),
            data_mapping: HashMap::new(),
            outputs: Vec::new(),
            subgraph_count: 0,
            expect_version: def.expect_version.clone(),
            priority: def.priority,
            skip_as_error: def.vertex_skip_as_error,
        };

        let mut gen_idx = 0usize;
        let mut producers: HashMap<DataId, Vec<usize>> = HashMap::new();
        for vdef in &def.vertex {
            let index = graph.vertices.len();
            let vertex = graph.create_vertex(vdef, index, &mut gen_idx, scope)?;
            if graph.index.contains_key(&vertex.id) {
                return Err(BuildError::DuplicateVertex {
                    graph: graph.name.clone(),
                    vertex: vertex.id.clone(),
                });
            }
            for out in &vertex.outputs {
                let republish = vertex.inputs.iter().any(|i| i.in_out && i.field == out.field);
                if scope.strict && !republish {
                    if let Some(&prev) = graph.data_mapping.get(&out.id) {
                        return Err(BuildError::DuplicateData {
                            graph: graph.name.clone(),
                            data: out.id.to_string(),
                            vertex: vertex.label().to_string(),
                            previous: graph.vertices[prev].label().to_string(),
                        });
                    }
                }
                graph.data_mapping.insert(out.id.clone(), index);
                producers.entry(out.id.clone()).or_default().push(index);
                if !graph.outputs.contains(&out.id) {
                    graph.outputs.push(out.id.clone());
                }
            }
            graph.index.insert(vertex.id.clone(), index);
            graph.vertices.push(vertex);
        }

        for (idx, vdef) in def.vertex.iter().enumerate() {
            graph.link_inputs(idx, &producers)?;
            graph.link_explicit(idx, vdef)?;
        }

        for vertex in &graph.vertices {
            if vertex.kind == VertexKind::Gate {
                continue;
            }
            graph.verify(vertex)?;
        }

        if let Some(path) = graph.detect_cycle() {
            return Err(BuildError::CircularDependency {
                graph: graph.name.clone(),
                path,
            });
        }

        let mut child_idx = 0;
        for vertex in &mut graph.vertices {
            if vertex.kind == VertexKind::SubGraph {
                vertex.child_idx = Some(child_idx);
                child_idx += 1;
            }
        }
        graph.subgraph_count = child_idx;

        tracing::debug!(
            graph = %graph.full_name(),
            vertices = graph.vertices.len(),
            subgraphs = graph.subgraph_count,
            "graph built"
        );
        Ok(graph)
    }

    fn create_vertex(
        &self,
        def: &VertexDef,
        index: usize,
        gen_idx: &mut usize,
        scope: &BuildScope<'_>,
    ) -> Result<Vertex, BuildError> {
        let mut args = def.args.clone();
        let mut label = None;
        let kind = if !def.while_expr.is_empty() {
            if def.graph.is_empty() {
                return Err(BuildError::LoopWithoutGraph {
                    graph: self.name.clone(),
                    vertex: self.display_id(def),
                });
            }
            VertexKind::Loop
        } else if !def.cond.is_empty() {
            args.insert(EXPR_ARG.to_string(), ParamValue::Str(def.cond.clone()));
            label = Some(def.cond.clone());
            VertexKind::Gate
        } else if !def.graph.is_empty() {
            if !def.processor.is_empty() {
                return Err(self.invalid(def, "vertex sets both processor and graph"));
            }
            VertexKind::SubGraph
        } else if !def.processor.is_empty() {
            VertexKind::Operator
        } else {
            return Err(self.invalid(def, "vertex needs a processor, cond, while or graph"));
        };

        let target = match kind {
            VertexKind::Loop | VertexKind::SubGraph => {
                let cluster = match def.cluster.as_str() {
                    "" | "." => scope.cluster.to_string(),
                    other => other.to_string(),
                };
                Some(GraphTarget {
                    cluster,
                    graph: def.graph.clone(),
                })
            }
            _ => None,
        };
        if let (VertexKind::Loop, Some(target)) = (kind, &target) {
            args.insert(EXPR_ARG.to_string(), ParamValue::Str(def.while_expr.clone()));
            args.insert(
                WHILE_CLUSTER_ARG.to_string(),
                ParamValue::Str(target.cluster.clone()),
            );
            args.insert(
                WHILE_GRAPH_ARG.to_string(),
                ParamValue::Str(target.graph.clone()),
            );
            args.insert(WHILE_ASYNC_ARG.to_string(), ParamValue::Bool(def.is_async));
            label = Some(format!("while {}", def.while_expr));
        }
        if kind == VertexKind::SubGraph {
            if !def.input.is_empty() || !def.output.is_empty() {
                return Err(self.invalid(def, "sub-graph vertex cannot bind input or output"));
            }
            if let Some(target) = &target {
                label = Some(format!("{}::{}", target.cluster, target.graph));
            }
        }

        let operator = match kind {
            VertexKind::Operator => Some(def.processor.clone()),
            VertexKind::Gate if def.processor.is_empty() => Some(scope.expr_operator.to_string()),
            VertexKind::Gate => Some(def.processor.clone()),
            VertexKind::Loop => Some(scope.while_operator.to_string()),
            VertexKind::SubGraph => None,
        };

        let (id, id_generated) = if !def.id.is_empty() {
            (def.id.clone(), false)
        } else if kind == VertexKind::Operator {
            (def.processor.clone(), false)
        } else {
            let id = format!("{}_{}", self.name, gen_idx);
            *gen_idx += 1;
            (id, true)
        };

        if !def.expect.is_empty() && !def.expect_config.is_empty() {
            return Err(BuildError::ExpectConflict {
                graph: self.name.clone(),
                vertex: id,
            });
        }
        let guard = if !def.expect_config.is_empty() {
            if !scope.has_setting(&def.expect_config) {
                return Err(BuildError::UnknownConfigSetting {
                    vertex: id,
                    setting: def.expect_config.clone(),
                });
            }
            Some(Guard::parse(&def.expect_config))
        } else if !def.expect.is_empty() {
            match Guard::parse(&def.expect) {
                Guard::Config { name, .. } if !scope.config_settings.contains(&name) => {
                    Some(Guard::Expr(def.expect.trim().to_string()))
                }
                guard => Some(guard),
            }
        } else {
            None
        };

        let mut select_args = Vec::with_capacity(def.select_args.len());
        for select in &def.select_args {
            let guard = Guard::parse(&select.match_expr);
            if let Guard::Config { name, .. } = &guard {
                if !scope.config_settings.contains(name) {
                    return Err(BuildError::UnknownConfigSetting {
                        vertex: id,
                        setting: select.match_expr.clone(),
                    });
                }
            }
            select_args.push(SelectArgs {
                guard,
                args: select.args.clone(),
            });
        }

        let (inputs, outputs) = match &operator {
            Some(op) => {
                let meta = scope.meta(op)?;
                (
                    resolve_inputs(&self.name, &id, meta, &def.input)?,
                    resolve_outputs(&id, meta, &def.output)?,
                )
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(Vertex {
            id,
            index,
            kind,
            id_generated,
            operator,
            label,
            target,
            child_idx: None,
            guard,
            select_args,
            args,
            inputs,
            outputs,
            deps: Vec::new(),
            dep_slots: HashMap::new(),
            successors: Vec::new(),
            start: def.start,
            is_async: def.is_async,
        })
    }

    /// Implicit dependencies from declared inputs.
    fn link_inputs(
        &mut self,
        idx: usize,
        producers: &HashMap<DataId, Vec<usize>>,
    ) -> Result<(), BuildError> {
        let mut edges = Vec::new();
        for input in &self.vertices[idx].inputs {
            let expect = if input.required { Expect::Ok } else { Expect::Any };
            for id in &input.ids {
                match pick_producer(producers.get(id), idx) {
                    Some(producer) => edges.push((producer, expect)),
                    None if input.is_extern => {}
                    // An in-out slot with no other producer reads only itself.
                    None if input.in_out && producers.get(id).is_some() => {}
                    None => {
                        return Err(BuildError::MissingInput {
                            graph: self.name.clone(),
                            vertex: self.vertices[idx].label().to_string(),
                            data: id.to_string(),
                        })
                    }
                }
            }
        }
        for (producer, expect) in edges {
            self.depend(idx, producer, expect);
        }
        Ok(())
    }

    fn link_explicit(&mut self, idx: usize, def: &VertexDef) -> Result<(), BuildError> {
        for (ids, expect) in [
            (&def.deps_on_err, Expect::Err),
            (&def.deps_on_ok, Expect::Ok),
            (&def.deps, Expect::Any),
        ] {
            for id in ids {
                let producer = self.lookup(idx, id)?;
                self.depend(idx, producer, expect);
            }
        }
        for (ids, expect) in [
            (&def.else_successor, Expect::Err),
            (&def.successor_on_err, Expect::Err),
            (&def.if_successor, Expect::Ok),
            (&def.successor_on_ok, Expect::Ok),
            (&def.successor, Expect::Any),
        ] {
            for id in ids {
                let consumer = self.lookup(idx, id)?;
                self.depend(consumer, idx, expect);
            }
        }
        Ok(())
    }

    fn lookup(&self, from: usize, id: &str) -> Result<usize, BuildError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| BuildError::MissingVertex {
                graph: self.name.clone(),
                vertex: self.vertices[from].label().to_string(),
                reference: id.to_string(),
            })
    }

    /// Record `consumer` depending on `producer`. The first edge between a pair wins.
    fn depend(&mut self, consumer: usize, producer: usize, expect: Expect) {
        if self.vertices[consumer].depend_on(producer, expect) {
            self.vertices[producer].successors.push(consumer);
        }
    }

    fn verify(&self, vertex: &Vertex) -> Result<(), BuildError> {
        let reason = if vertex.start {
            (!vertex.deps.is_empty()).then_some("start vertex has dependencies")
        } else {
            (vertex.deps.is_empty() && vertex.successors.is_empty())
                .then_some("vertex has no dependency and no successor")
        };
        match reason {
            Some(reason) => Err(BuildError::InvalidVertex {
                graph: self.name.clone(),
                vertex: vertex.label().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Depth-first search over successor edges; returns the cycle as `a -> b -> a`.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for idx in 0..self.vertices.len() {
            if !visited.contains(&idx) && self.dfs_cycle(idx, &mut visited, &mut stack) {
                let path: Vec<&str> = stack.iter().map(|&i| self.vertices[i].label()).collect();
                return Some(path.join(" -> "));
            }
        }
        None
    }

    fn dfs_cycle(&self, node: usize, visited: &mut HashSet<usize>, stack: &mut Vec<usize>) -> bool {
        visited.insert(node);
        stack.push(node);
        for &next in &self.vertices[node].successors {
            if let Some(pos) = stack.iter().position(|&x| x == next) {
                stack.push(next);
                *stack = stack[pos..].to_vec();
                return true;
            }
            if !visited.contains(&next) && self.dfs_cycle(next, visited, stack) {
                return true;
            }
        }
        stack.pop();
        false
    }

    fn display_id(&self, def: &VertexDef) -> String {
        if !def.id.is_empty() {
            def.id.clone()
        } else if !def.processor.is_empty() {
            def.processor.clone()
        } else {
            format!("{}[{}]", self.name, self.vertices.len())
        }
    }

    fn invalid(&self, def: &VertexDef, reason: &'static str) -> BuildError {
        BuildError::InvalidVertex {
            graph: self.name.clone(),
            vertex: self.display_id(def),
            reason,
        }
    }
}

/// Latest producer declared before `consumer`, else the latest other producer.
fn pick_producer(candidates: Option<&Vec<usize>>, consumer: usize) -> Option<usize> {
    let candidates = candidates?;
    candidates
        .iter()
        .rev()
        .find(|&&p| p < consumer)
        .or_else(|| candidates.iter().rev().find(|&&p| p != consumer))
        .copied()
}

fn resolve_inputs(
    graph: &str,
    vertex: &str,
    meta: &OperatorMeta,
    declared: &[GraphDataDef],
) -> Result<Vec<InputBinding>, BuildError> {
    for data in declared {
        if data.field.is_empty() {
            return Err(BuildError::EmptyField {
                vertex: vertex.to_string(),
            });
        }
        if meta.input_slot(&data.field).is_none() {
            return Err(BuildError::UnknownField {
                vertex: vertex.to_string(),
                operator: meta.name.clone(),
                field: data.field.clone(),
            });
        }
    }

    let mut bindings = Vec::with_capacity(meta.input.len());
    for (slot, info) in meta.input.iter().enumerate() {
        let data = declared.iter().find(|d| d.field == info.name);
        let name = match data {
            Some(d) if !d.id.is_empty() => d.id.clone(),
            _ => info.name.clone(),
        };
        let aggregate_names = data.map(|d| d.aggregate.as_slice()).unwrap_or_default();
        if !aggregate_names.is_empty() && !info.flags.aggregate {
            return Err(BuildError::InvalidVertex {
                graph: graph.to_string(),
                vertex: vertex.to_string(),
                reason: "aggregate names on a non-aggregate input",
            });
        }
        let ids = if info.flags.aggregate {
            aggregate_names
                .iter()
                .map(|n| DataId::new(n.clone(), info.ty))
                .collect()
        } else {
            vec![DataId::new(name, info.ty)]
        };
        bindings.push(InputBinding {
            field: info.name.clone(),
            slot,
            ids,
            aggregate: info.flags.aggregate,
            required: data.is_some_and(|d| d.required),
            is_move: info.flags.in_out || data.is_some_and(|d| d.is_move),
            is_extern: info.flags.is_extern || data.is_some_and(|d| d.is_extern),
            in_out: info.flags.in_out,
        });
    }
    Ok(bindings)
}

fn resolve_outputs(
    vertex: &str,
    meta: &OperatorMeta,
    declared: &[GraphDataDef],
) -> Result<Vec<OutputBinding>, BuildError> {
    for data in declared {
        if data.field.is_empty() {
            return Err(BuildError::EmptyField {
                vertex: vertex.to_string(),
            });
        }
        if meta.output_slot(&data.field).is_none() {
            return Err(BuildError::UnknownField {
                vertex: vertex.to_string(),
                operator: meta.name.clone(),
                field: data.field.clone(),
            });
        }
    }

    let mut bindings = Vec::with_capacity(meta.output.len());
    for (slot, info) in meta.output.iter().enumerate() {
        let name = declared
            .iter()
            .find(|d| d.field == info.name && !d.id.is_empty())
            .map(|d| d.id.clone())
            .unwrap_or_else(|| info.name.clone());
        bindings.push(OutputBinding {
            field: info.name.clone(),
            slot,
            id: DataId::new(name, info.ty),
        });
    }
    Ok(bindings)
}
