use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::ClusterDef;
use crate::error::BuildError;
use crate::operator::OperatorRegistry;

use super::graph::{BuildScope, Graph};
use super::vertex::Guard;

/// Named boolean computed from a predicate at the start of every cluster run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSetting {
    pub name: String,
    pub cond: String,
}

/// A built cluster: its graphs plus the settings shared by all of them.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub(crate) name: String,
    pub(crate) desc: String,
    pub(crate) strict_dsl: bool,
    pub(crate) expr_operator: String,
    pub(crate) while_operator: String,
    pub(crate) pool_size: usize,
    pub(crate) graphs: HashMap<String, Arc<Graph>>,
    /// Graph names in declaration order.
    pub(crate) order: Vec<String>,
    pub(crate) config_settings: Vec<ConfigSetting>,
}

impl Cluster {
    pub fn build(
        name: &str,
        def: &ClusterDef,
        registry: &OperatorRegistry,
    ) -> Result<Self, BuildError> {
        if def.graph.is_empty() {
            return Err(BuildError::EmptyCluster(name.to_string()));
        }
        let expr_operator = non_empty(&def.default_expr_processor, crate::config::DEFAULT_EXPR_OPERATOR);
        let while_operator = non_empty(&def.default_while_processor, crate::config::DEFAULT_WHILE_OPERATOR);
        if !def.config_setting.is_empty() && !registry.contains(&expr_operator) {
            return Err(BuildError::OperatorNotFound(expr_operator));
        }

        let setting_names: HashSet<String> =
            def.config_setting.iter().map(|c| c.name.clone()).collect();
        let scope = BuildScope {
            cluster: name,
            strict: def.strict_dsl,
            expr_operator: &expr_operator,
            while_operator: &while_operator,
            config_settings: &setting_names,
            registry,
        };

        // Same name and version is a conflict; otherwise the higher priority wins.
        let mut selected: Vec<usize> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (idx, gdef) in def.graph.iter().enumerate() {
            match by_name.get(gdef.name.as_str()) {
                Some(&prev) => {
                    let existing = &def.graph[prev];
                    if existing.expect_version == gdef.expect_version {
                        return Err(BuildError::DuplicateGraph {
                            cluster: name.to_string(),
                            graph: gdef.name.clone(),
                            version: gdef.expect_version.clone(),
                        });
                    }
                    if gdef.priority > existing.priority {
                        by_name.insert(&gdef.name, idx);
                        if let Some(slot) = selected.iter_mut().find(|s| **s == prev) {
                            *slot = idx;
                        }
                    }
                }
                None => {
                    by_name.insert(&gdef.name, idx);
                    selected.push(idx);
                }
            }
        }

        let mut graphs = HashMap::with_capacity(selected.len());
        let mut order = Vec::with_capacity(selected.len());
        for idx in selected {
            let graph = Graph::build(&def.graph[idx], &scope)?;
            order.push(graph.name.clone());
            graphs.insert(graph.name.clone(), Arc::new(graph));
        }

        let needs_expr = graphs.values().flat_map(|g| g.vertices.iter()).any(|v| {
            matches!(v.guard, Some(Guard::Expr(_)))
                || v.select_args.iter().any(|s| matches!(s.guard, Guard::Expr(_)))
        });
        if needs_expr && !registry.contains(&expr_operator) {
            return Err(BuildError::OperatorNotFound(expr_operator));
        }

        let cluster = Cluster {
            name: name.to_string(),
            desc: def.desc.clone(),
            strict_dsl: def.strict_dsl,
            expr_operator,
            while_operator,
            pool_size: def.default_context_pool_size.max(1),
            graphs,
            order,
            config_settings: def
                .config_setting
                .iter()
                .map(|c| ConfigSetting {
                    name: c.name.clone(),
                    cond: c.cond.clone(),
                })
                .collect(),
        };
        tracing::info!(
            cluster = %cluster.name,
            graphs = cluster.graphs.len(),
            settings = cluster.config_settings.len(),
            "cluster built"
        );
        Ok(cluster)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn is_strict(&self) -> bool {
        self.strict_dsl
    }

    pub fn expr_operator(&self) -> &str {
        &self.expr_operator
    }

    pub fn while_operator(&self) -> &str {
        &self.while_operator
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name).map(Arc::as_ref)
    }

    /// Graphs in declaration order.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.order.iter().filter_map(|n| self.graph(n))
    }

    pub fn config_settings(&self) -> &[ConfigSetting] {
        &self.config_settings
    }
}

fn non_empty(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
