//! Read-only graph store
//!
//! The orchestrator consumes graph definitions through the [`GraphStore`]
//! trait. [`InMemoryGraphStore`] is built once from a validated
//! [`GraphDefinition`] and indexes edges by `(source, decision key)` so
//! routing is a map lookup rather than a scan over condition strings.
//!
//! The store is immutable after construction and safe for concurrent reads.

use crate::decision::DecisionKey;
use crate::error::{GraphError, Result};
use crate::graph::{EdgeDefinition, GraphDefinition, NodeDefinition, END, ENTRY_NODE};
use std::collections::HashMap;
use std::path::Path;

/// Read surface over graph definitions
pub trait GraphStore: Send + Sync {
    /// Look up a node by name
    fn get_node(&self, name: &str) -> Result<&NodeDefinition>;

    /// All outgoing edges of a node, in declaration order
    fn get_edges(&self, source: &str) -> Vec<&EdgeDefinition>;

    /// The entry node (`planner` by convention)
    fn get_entry_node(&self) -> Result<&NodeDefinition> {
        self.get_node(ENTRY_NODE)
            .map_err(|_| GraphError::EntryNodeMissing(ENTRY_NODE.to_string()))
    }

    /// Resolve the next node name
    ///
    /// With a key, only a conditional edge carrying exactly that key matches.
    /// Without a key, the node's unconditional edge is followed.
    fn next_node(&self, source: &str, key: Option<&DecisionKey>) -> Result<String> {
        let edges = self.get_edges(source);
        let edge = edges.iter().find(|e| e.condition.as_ref() == key);
        edge.map(|e| e.target.clone())
            .ok_or_else(|| GraphError::NoMatchingEdge {
                node: source.to_string(),
                decision: key
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "<unconditional>".to_string()),
            })
    }
}

/// Graph store backed by an indexed in-memory definition
#[derive(Debug, Clone)]
pub struct InMemoryGraphStore {
    definition: GraphDefinition,
    nodes: HashMap<String, NodeDefinition>,
    edges_by_source: HashMap<String, Vec<EdgeDefinition>>,
    conditional: HashMap<(String, DecisionKey), String>,
    unconditional: HashMap<String, String>,
}

impl InMemoryGraphStore {
    /// Validate and index a definition
    ///
    /// An `END` node is added when the definition leaves it implicit.
    pub fn from_definition(definition: GraphDefinition) -> Result<Self> {
        definition.validate()?;

        let mut nodes: HashMap<String, NodeDefinition> = definition
            .nodes
            .iter()
            .map(|n| (n.name.clone(), n.clone()))
            .collect();
        nodes
            .entry(END.to_string())
            .or_insert_with(NodeDefinition::end);

        let mut edges_by_source: HashMap<String, Vec<EdgeDefinition>> = HashMap::new();
        let mut conditional = HashMap::new();
        let mut unconditional = HashMap::new();

        for edge in &definition.edges {
            edges_by_source
                .entry(edge.source.clone())
                .or_default()
                .push(edge.clone());
            match &edge.condition {
                Some(key) => {
                    conditional.insert((edge.source.clone(), key.clone()), edge.target.clone());
                }
                None => {
                    unconditional.insert(edge.source.clone(), edge.target.clone());
                }
            }
        }

        tracing::debug!(
            graph = %definition.name,
            nodes = nodes.len(),
            edges = definition.edges.len(),
            "Indexed graph definition"
        );

        Ok(Self {
            definition,
            nodes,
            edges_by_source,
            conditional,
            unconditional,
        })
    }

    /// Parse, validate and index a YAML (or JSON) definition
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_definition(GraphDefinition::from_yaml_str(yaml)?)
    }

    /// Read a definition file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Validation(format!("failed to read graph file {:?}: {}", path, e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }
}

impl GraphStore for InMemoryGraphStore {
    fn get_node(&self, name: &str) -> Result<&NodeDefinition> {
        self.nodes
            .get(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    fn get_edges(&self, source: &str) -> Vec<&EdgeDefinition> {
        self.edges_by_source
            .get(source)
            .map(|edges| edges.iter().collect())
            .unwrap_or_default()
    }

    fn next_node(&self, source: &str, key: Option<&DecisionKey>) -> Result<String> {
        let target = match key {
            Some(key) => self.conditional.get(&(source.to_string(), key.clone())),
            None => self.unconditional.get(source),
        };
        target.cloned().ok_or_else(|| GraphError::NoMatchingEdge {
            node: source.to_string(),
            decision: key
                .map(|k| k.to_string())
                .unwrap_or_else(|| "<unconditional>".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeConfig, NodeKind};

    const GRAPH: &str = r#"
name: research
nodes:
  - { name: planner, kind: ROUTER }
  - { name: Search, kind: TOOL }
  - { name: reflection, kind: ROUTER }
  - { name: output, kind: ROUTER }
  - { name: Report, kind: TOOL, config: { is_output_tool: true } }
edges:
  - { source: planner, target: Search, condition: "CALL_TOOL:Search" }
  - { source: Search, target: reflection }
  - { source: reflection, target: planner }
  - { source: planner, target: output, condition: FINISH }
  - { source: output, target: Report, condition: "OUTPUT:Report" }
  - { source: Report, target: END }
"#;

    #[test]
    fn test_entry_and_implicit_end() {
        let store = InMemoryGraphStore::from_yaml_str(GRAPH).unwrap();
        assert_eq!(store.get_entry_node().unwrap().name, "planner");

        let end = store.get_node(END).unwrap();
        assert_eq!(end.kind, NodeKind::Tool);
        assert!(end.is_end());
    }

    #[test]
    fn test_routing_lookup() {
        let store = InMemoryGraphStore::from_yaml_str(GRAPH).unwrap();

        assert_eq!(
            store
                .next_node("planner", Some(&DecisionKey::call_tool("Search")))
                .unwrap(),
            "Search"
        );
        assert_eq!(
            store.next_node("planner", Some(&DecisionKey::finish())).unwrap(),
            "output"
        );
        assert_eq!(store.next_node("Search", None).unwrap(), "reflection");
        assert_eq!(store.next_node("Report", None).unwrap(), END);
    }

    #[test]
    fn test_unmatched_key_fails_fast() {
        let store = InMemoryGraphStore::from_yaml_str(GRAPH).unwrap();

        let err = store
            .next_node("planner", Some(&DecisionKey::call_tool("Browse")))
            .unwrap_err();
        assert!(matches!(err, GraphError::NoMatchingEdge { .. }));

        // Planner has no unconditional edge
        assert!(store.next_node("planner", None).is_err());
    }

    #[test]
    fn test_default_next_node_matches_indexed_lookup() {
        struct Plain(GraphDefinition);

        impl GraphStore for Plain {
            fn get_node(&self, name: &str) -> Result<&NodeDefinition> {
                self.0
                    .node(name)
                    .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
            }

            fn get_edges(&self, source: &str) -> Vec<&EdgeDefinition> {
                self.0.edges.iter().filter(|e| e.source == source).collect()
            }
        }

        let indexed = InMemoryGraphStore::from_yaml_str(GRAPH).unwrap();
        let plain = Plain(indexed.definition().clone());

        for (source, key) in [
            ("planner", Some(DecisionKey::call_tool("Search"))),
            ("planner", Some(DecisionKey::finish())),
            ("output", Some(DecisionKey::emit_output("Report"))),
            ("reflection", None),
        ] {
            assert_eq!(
                plain.next_node(source, key.as_ref()).unwrap(),
                indexed.next_node(source, key.as_ref()).unwrap()
            );
        }
    }

    #[test]
    fn test_edges_in_declaration_order() {
        let store = InMemoryGraphStore::from_yaml_str(GRAPH).unwrap();
        let targets: Vec<_> = store
            .get_edges("planner")
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(targets, vec!["Search", "output"]);
        assert!(store.get_edges(END).is_empty());
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let definition = GraphDefinition::new("bad").add_node(
            NodeDefinition::tool("planner").with_config(NodeConfig::new()),
        );
        assert!(InMemoryGraphStore::from_definition(definition).is_err());
    }
}
