//! Dependency graph over tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::{Relationship, RelationshipKind};

/// Load order: every table after the tables it references.
///
/// Tables with no unloaded dependencies go first, one wave at a time, each
/// wave sorted by name. References to unknown tables and self references
/// are ignored. Tables caught in a cycle are appended in sorted order.
pub fn load_order<'a>(
    tables: impl IntoIterator<Item = &'a str>,
    edges: &[Relationship],
) -> Vec<String> {
    let tables: BTreeSet<&str> = tables.into_iter().collect();

    // table -> tables it depends on
    let mut depends_on: BTreeMap<&str, BTreeSet<&str>> =
        tables.iter().map(|t| (*t, BTreeSet::new())).collect();
    // table -> tables that depend on it
    let mut dependents: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for edge in edges {
        let source = edge.source_table.as_str();
        let target = edge.target_table.as_str();
        if source == target || !tables.contains(source) || !tables.contains(target) {
            continue;
        }
        if let Some(deps) = depends_on.get_mut(source) {
            deps.insert(target);
        }
        dependents.entry(target).or_default().insert(source);
    }

    let mut order = Vec::with_capacity(tables.len());
    loop {
        let wave: Vec<&str> = depends_on
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(t, _)| *t)
            .collect();
        if wave.is_empty() {
            break;
        }
        for table in &wave {
            depends_on.remove(table);
            for dependent in dependents.get(table).into_iter().flatten() {
                if let Some(deps) = depends_on.get_mut(dependent) {
                    deps.remove(table);
                }
            }
        }
        order.extend(wave.into_iter().map(str::to_string));
    }

    if !depends_on.is_empty() {
        tracing::debug!(
            "{} tables in reference cycles appended to load order",
            depends_on.len()
        );
        order.extend(depends_on.into_keys().map(str::to_string));
    }

    order
}

/// A table node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    pub name: String,
    /// False for tables referenced but not loaded.
    pub loaded: bool,
}

/// Tables and relationship edges as a directed graph.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: DiGraph<TableNode, Relationship>,
    node_index: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new<'a>(tables: impl IntoIterator<Item = &'a str>, edges: &[Relationship]) -> Self {
        let mut graph = Self::default();
        let mut sorted: Vec<&str> = tables.into_iter().collect();
        sorted.sort_unstable();
        for table in sorted {
            graph.add_node(table, true);
        }
        for edge in edges {
            let source = graph.add_node(&edge.source_table, false);
            let target = graph.add_node(&edge.target_table, false);
            graph.graph.add_edge(source, target, edge.clone());
        }
        graph
    }

    fn add_node(&mut self, name: &str, loaded: bool) -> NodeIndex {
        if let Some(idx) = self.node_index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(TableNode {
            name: name.to_string(),
            loaded,
        });
        self.node_index.insert(name.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tables `table` references, sorted.
    pub fn dependencies(&self, table: &str) -> Vec<&str> {
        self.neighbors(table, Direction::Outgoing)
    }

    /// Tables that reference `table`, sorted.
    pub fn dependents(&self, table: &str) -> Vec<&str> {
        self.neighbors(table, Direction::Incoming)
    }

    fn neighbors(&self, table: &str, direction: Direction) -> Vec<&str> {
        let Some(idx) = self.node_index.get(table) else {
            return Vec::new();
        };
        let names: BTreeSet<&str> = self
            .graph
            .neighbors_directed(*idx, direction)
            .map(|n| self.graph[n].name.as_str())
            .collect();
        names.into_iter().collect()
    }

    /// Edges leaving `table`.
    pub fn edges_from(&self, table: &str) -> Vec<&Relationship> {
        let Some(idx) = self.node_index.get(table) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| e.weight())
            .collect()
    }

    /// Graphviz DOT text. Lookup edges are solid, table-name edges dashed,
    /// unloaded tables drawn dashed.
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.graph,
            &[Config::EdgeNoLabel, Config::NodeNoLabel],
            &|_, edge| {
                let style = match edge.weight().kind {
                    RelationshipKind::Lookup => "solid",
                    RelationshipKind::TableName => "dashed",
                };
                format!("label=\"{}\", style={}", escape(&edge.weight().column), style)
            },
            &|_, (_, node)| {
                let style = if node.loaded { "solid" } else { "dashed" };
                format!("label=\"{}\", style={}", escape(&node.name), style)
            },
        );
        format!("{:?}", dot)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
