// Text, JSON, DOT and Mermaid rendering of assembled lineage graphs, plus
// reachability queries over them.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};

use crate::types::{LineageDirection, LineageGraph};

/// Output format for [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Dot,
    Mermaid,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            other => Err(format!(
                "unknown format {other:?} (expected text, json, dot, mermaid)"
            )),
        }
    }
}

pub fn render(graph: &LineageGraph, format: ExportFormat) -> Result<String, serde_json::Error> {
    Ok(match format {
        ExportFormat::Text => render_text(graph),
        ExportFormat::Json => serde_json::to_string_pretty(graph)?,
        ExportFormat::Dot => render_dot(graph),
        ExportFormat::Mermaid => render_mermaid(graph),
    })
}

fn node_label(graph: &LineageGraph, id: &str) -> String {
    match graph.node(id) {
        Some(node) => match &node.details {
            Some(details) => format!("{} ({})", details.label(), node.item_subtype),
            None => format!("{} ({})", node.id, node.item_subtype),
        },
        None => id.to_string(),
    }
}

pub fn render_text(graph: &LineageGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Nodes ({}):", graph.nodes.len());
    for node in &graph.nodes {
        let name = node
            .details
            .as_ref()
            .map_or(node.id.as_str(), |d| d.label());
        let _ = writeln!(
            out,
            "  {:<40} {:<10} {}",
            name, node.item_category, node.item_subtype
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Links ({}):", graph.links.len());
    for link in &graph.links {
        let _ = writeln!(out, "  {} --{}--> {}", link.source, link.kind, link.target);
    }
    let dangling = graph.dangling_links();
    if !dangling.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Dangling links ({}):", dangling.len());
        for link in dangling {
            let _ = writeln!(out, "  {} -> {}", link.source, link.target);
        }
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn render_dot(graph: &LineageGraph) -> String {
    let mut out = String::from("digraph lineage {\n  rankdir=LR;\n  node [shape=box];\n");
    for node in &graph.nodes {
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\"];",
            escape(&node.id),
            escape(&node_label(graph, &node.id))
        );
    }
    for link in &graph.links {
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\"];",
            escape(&link.source),
            escape(&link.target),
            escape(&link.kind)
        );
    }
    out.push_str("}\n");
    out
}

pub fn render_mermaid(graph: &LineageGraph) -> String {
    // Mermaid ids must be simple tokens; record handles contain '/' and '.'.
    let ids: HashMap<&str, String> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), format!("n{i}")))
        .collect();
    let token = |id: &str| ids.get(id).cloned().unwrap_or_else(|| sanitize(id));

    let mut out = String::from("graph LR\n");
    for node in &graph.nodes {
        let _ = writeln!(
            out,
            "  {}[\"{}\"]",
            token(&node.id),
            mermaid_text(&node_label(graph, &node.id))
        );
    }
    for link in &graph.links {
        let _ = writeln!(
            out,
            "  {} -->|\"{}\"| {}",
            token(&link.source),
            mermaid_text(&link.kind),
            token(&link.target)
        );
    }
    out
}

/// Mermaid text in quoted labels: quotes and pipes become entity codes.
fn mermaid_text(s: &str) -> String {
    s.replace('"', "#quot;").replace('|', "#124;")
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Ids reachable from `id` following links in `direction`, excluding `id`.
///
/// Links point from the record something was derived from to what was
/// derived from it, so downstream follows links forward and upstream follows
/// them backwards. Dangling link endpoints take part in the walk.
pub fn reachable(graph: &LineageGraph, id: &str, direction: LineageDirection) -> BTreeSet<String> {
    let (dag, index) = to_digraph(graph);
    let Some(&start) = index.get(id) else {
        return BTreeSet::new();
    };

    let mut seen = BTreeSet::new();
    match direction {
        LineageDirection::Downstream => {
            let mut bfs = Bfs::new(&dag, start);
            while let Some(nx) = bfs.next(&dag) {
                seen.insert(dag[nx].to_string());
            }
        }
        LineageDirection::Upstream => {
            let reversed = Reversed(&dag);
            let mut bfs = Bfs::new(reversed, start);
            while let Some(nx) = bfs.next(reversed) {
                seen.insert(dag[nx].to_string());
            }
        }
    }
    seen.remove(id);
    seen
}

/// Number of direct neighbours in each direction.
pub fn degree(graph: &LineageGraph, id: &str) -> (usize, usize) {
    let (dag, index) = to_digraph(graph);
    index.get(id).map_or((0, 0), |&nx| {
        (
            dag.neighbors_directed(nx, Direction::Incoming).count(),
            dag.neighbors_directed(nx, Direction::Outgoing).count(),
        )
    })
}

fn to_digraph(graph: &LineageGraph) -> (DiGraph<&str, &str>, HashMap<&str, NodeIndex>) {
    let mut dag = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &graph.nodes {
        index
            .entry(node.id.as_str())
            .or_insert_with(|| dag.add_node(node.id.as_str()));
    }
    for link in &graph.links {
        let s = *index
            .entry(link.source.as_str())
            .or_insert_with(|| dag.add_node(link.source.as_str()));
        let t = *index
            .entry(link.target.as_str())
            .or_insert_with(|| dag.add_node(link.target.as_str()));
        dag.add_edge(s, t, link.kind.as_str());
    }
    (dag, index)
}
