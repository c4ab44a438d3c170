//! Dependency graph for ordering config item evaluation
//!
//! Nodes are item names; an edge `a -> b` means "a depends on b". Evaluation
//! repeatedly takes every head node (no remaining dependencies), evaluates
//! it, then resolves it out of the graph:
//!
//! ```rust
//! use rigging_core::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("url", "host");
//! graph.add_node("host");
//!
//! assert_eq!(graph.head_nodes().unwrap(), vec!["host".to_string()]);
//! graph.resolve("host");
//! assert_eq!(graph.head_nodes().unwrap(), vec!["url".to_string()]);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::{ConfigGroup, all_items};
use crate::error::{CoreError, Result};

/// Matches `ConfigOption("name")` and its `Index`/`Data`/`Equals`/`NotEquals` variants
static CONFIG_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ConfigOption(?:Index|Data|Equals|NotEquals)?\s*\(\s*["']([^"']+)["']"#)
        .expect("config reference pattern is valid")
});

/// Directed graph of "X depends on Y" edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a config schema
    ///
    /// Every item becomes a node. Edges come from `ConfigOption*` references
    /// in the item's `value`, `default` and `when` templates; references to
    /// names that are not declared items are ignored, as are self references.
    pub fn from_config_groups(groups: &[ConfigGroup]) -> Self {
        let declared: HashSet<&str> = all_items(groups).map(|i| i.name.as_str()).collect();
        let mut graph = Self::new();

        for item in all_items(groups) {
            graph.add_node(&item.name);
            for template in item.templates() {
                for reference in config_references(template) {
                    if reference != item.name && declared.contains(reference.as_str()) {
                        graph.add_dependency(&item.name, &reference);
                    }
                }
            }
        }

        graph
    }

    /// Ensure a node exists
    pub fn add_node(&mut self, name: &str) {
        self.dependencies.entry(name.to_string()).or_default();
    }

    /// Record that `node` depends on `depends_on`
    ///
    /// `depends_on` is only referenced, not created as a node.
    pub fn add_dependency(&mut self, node: &str, depends_on: &str) {
        self.dependencies
            .entry(node.to_string())
            .or_default()
            .insert(depends_on.to_string());
    }

    /// All nodes with no remaining dependencies, sorted by name
    pub fn head_nodes(&self) -> Result<Vec<String>> {
        let heads: Vec<String> = self
            .dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        if heads.is_empty() && !self.dependencies.is_empty() {
            return Err(CoreError::CycleDetected {
                nodes: self.dependencies.keys().cloned().collect(),
            });
        }

        Ok(heads)
    }

    /// Remove `name` from every dependency set, then delete the node itself
    pub fn resolve(&mut self, name: &str) {
        for deps in self.dependencies.values_mut() {
            deps.remove(name);
        }
        self.dependencies.remove(name);
    }

    /// Remaining edges, for diagnostics
    pub fn unresolved_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(name, deps)| (name.clone(), deps.iter().cloned().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Names referenced through `ConfigOption*` calls in a template
pub fn config_references(template: &str) -> Vec<String> {
    CONFIG_REFERENCE
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigItem;

    /// Drain the graph, returning batches of head nodes in resolution order
    fn drain(graph: &mut DependencyGraph) -> Result<Vec<Vec<String>>> {
        let mut batches = Vec::new();
        while !graph.is_empty() {
            let heads = graph.head_nodes()?;
            for head in &heads {
                graph.resolve(head);
            }
            batches.push(heads);
        }
        Ok(batches)
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_dependency("a", "b");
        graph.add_node("a");

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.unresolved_dependencies()["a"], vec!["b".to_string()]);
    }

    #[test]
    fn test_add_dependency_does_not_create_target() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "b");

        assert_eq!(graph.len(), 1);
        assert!(matches!(
            graph.head_nodes(),
            Err(CoreError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_acyclic_graph_visits_every_node_once() {
        let mut graph = DependencyGraph::new();
        for name in ["a", "b", "c", "d", "e"] {
            graph.add_node(name);
        }
        graph.add_dependency("b", "a");
        graph.add_dependency("c", "a");
        graph.add_dependency("d", "b");
        graph.add_dependency("d", "c");
        graph.add_dependency("e", "d");

        let edges = graph.unresolved_dependencies();
        let batches = drain(&mut graph).unwrap();
        let order: Vec<String> = batches.concat();

        assert_eq!(order.len(), 5);
        let unique: BTreeSet<_> = order.iter().collect();
        assert_eq!(unique.len(), 5);

        let position = |n: &str| order.iter().position(|x| x == n).unwrap();
        for (node, deps) in edges {
            for dep in deps {
                assert!(position(&dep) < position(&node), "{dep} before {node}");
            }
        }
        assert!(graph.is_empty());
    }

    #[test]
    fn test_head_nodes_are_sorted() {
        let mut graph = DependencyGraph::new();
        graph.add_node("zeta");
        graph.add_node("alpha");
        graph.add_node("mid");

        assert_eq!(graph.head_nodes().unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_node("root");
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");

        let err = drain(&mut graph).unwrap_err();
        match err {
            CoreError::CycleDetected { nodes } => assert_eq!(nodes, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_graph_has_no_heads() {
        let graph = DependencyGraph::new();
        assert!(graph.head_nodes().unwrap().is_empty());
    }

    #[test]
    fn test_config_references() {
        let refs = config_references(
            r#"{{repl ConfigOption("host") }}:{{repl ConfigOptionData('cert') }} {{repl ConfigOptionEquals("tls", "1") }}"#,
        );
        assert_eq!(refs, vec!["host", "cert", "tls"]);
    }

    #[test]
    fn test_from_config_groups() {
        let groups = vec![ConfigGroup::new(
            "main",
            vec![
                ConfigItem::text("url")
                    .with_default(r#"https://{{repl ConfigOption("host") }}:{{repl ConfigOption("port") }}"#),
                ConfigItem::text("host").with_default("localhost"),
                ConfigItem::text("port").with_value(r#"{{repl ConfigOption("undeclared") }}"#),
                ConfigItem::text("loop").with_default(r#"{{repl ConfigOption("loop") }}"#),
            ],
        )];

        let mut graph = DependencyGraph::from_config_groups(&groups);
        assert_eq!(graph.len(), 4);
        assert_eq!(
            graph.unresolved_dependencies()["url"],
            vec!["host".to_string(), "port".to_string()]
        );

        let batches = drain(&mut graph).unwrap();
        assert_eq!(batches[0], vec!["host", "loop", "port"]);
        assert_eq!(batches[1], vec!["url"]);
    }
}
