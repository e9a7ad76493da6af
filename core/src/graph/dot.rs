//! Graphviz rendering of built clusters.

use std::fmt::Write;

use super::cluster::Cluster;
use super::graph::Graph;
use super::vertex::{Expect, Guard, Vertex, VertexKind};

impl Cluster {
    /// Render every graph as a `subgraph cluster_*` block of one digraph.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph G {\n");
        out.push_str("    rankdir=LR;\n");
        for graph in self.graphs() {
            dump_graph(self, graph, &mut out);
        }
        out.push_str("}\n");
        out
    }
}

fn dot_id(graph: &Graph, vertex: &Vertex) -> String {
    format!("{}_{}", graph.name, vertex.id)
}

fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}

fn dump_graph(cluster: &Cluster, graph: &Graph, out: &mut String) {
    let g = &graph.name;
    let _ = writeln!(out, "  subgraph cluster_{g}{{");
    out.push_str("    style = rounded;\n");
    let _ = writeln!(out, "    label = \"{g}\";");
    let _ = writeln!(
        out,
        "    {g}__START__[color=black fillcolor=deepskyblue style=filled shape=Msquare label=\"START\"];"
    );
    let _ = writeln!(
        out,
        "    {g}__STOP__[color=black fillcolor=deepskyblue style=filled shape=Msquare label=\"STOP\"];"
    );

    for vertex in &graph.vertices {
        let style = match vertex.kind {
            VertexKind::Gate => "shape=diamond color=black fillcolor=aquamarine style=filled",
            VertexKind::SubGraph | VertexKind::Loop => {
                "shape=box3d, color=blue fillcolor=aquamarine style=filled"
            }
            VertexKind::Operator => "color=black fillcolor=linen style=filled",
        };
        let _ = writeln!(
            out,
            "    {} [label=\"{}\" {style}];",
            dot_id(graph, vertex),
            escape(vertex.label())
        );
    }

    for setting in &cluster.config_settings {
        let _ = writeln!(
            out,
            "    {g}_{name} [label=\"{name}\" shape=diamond color=black fillcolor=aquamarine style=filled];",
            name = setting.name
        );
    }

    for vertex in &graph.vertices {
        let id = dot_id(graph, vertex);
        if let Some(Guard::Config { name, negate }) = &vertex.guard {
            let setting = format!("{g}_{name}");
            if *negate {
                let _ = writeln!(out, "    {setting} -> {id} [style=dashed color=red label=\"err\"];");
            } else {
                let _ = writeln!(out, "    {setting} -> {id} [style=bold label=\"ok\"];");
            }
            let _ = writeln!(out, "    {g}__START__ -> {setting};");
        }
        if vertex.successors.is_empty() {
            let _ = writeln!(out, "    {id} -> {g}__STOP__;");
        }
        if vertex.deps.is_empty() {
            let _ = writeln!(out, "    {g}__START__ -> {id};");
        }
        for dep in &vertex.deps {
            let producer = dot_id(graph, &graph.vertices[dep.vertex]);
            let attrs = match dep.expect {
                Expect::Ok => "[style=dashed label=\"ok\"]",
                Expect::Err => "[style=dashed color=red label=\"err\"]",
                Expect::Any => "[style=bold label=\"all\"]",
            };
            let _ = writeln!(out, "    {producer} -> {id} {attrs};");
        }
    }
    out.push_str("};\n");
}
