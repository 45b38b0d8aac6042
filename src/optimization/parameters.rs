//! Parameter clamping for known node types

use crate::graph::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Clamp `field` on nodes of `node_type` to `clamp_to` when it exceeds `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRule {
    pub node_type: String,
    pub field: String,
    pub threshold: f64,
    pub clamp_to: f64,
}

impl ParameterRule {
    pub fn new(node_type: &str, field: &str, threshold: f64, clamp_to: f64) -> Self {
        Self {
            node_type: node_type.to_string(),
            field: field.to_string(),
            threshold,
            clamp_to,
        }
    }

    fn applies_to(&self, kind: &NodeKind) -> bool {
        kind.as_str() == self.node_type
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterLimits {
    pub rules: Vec<ParameterRule>,
}

impl Default for ParameterLimits {
    fn default() -> Self {
        Self {
            rules: vec![
                ParameterRule::new("memory-store", "maxTokens", 4000.0, 2000.0),
                ParameterRule::new("memory-store", "ttl", 120.0, 60.0),
                ParameterRule::new("rag-retriever", "maxResults", 5.0, 3.0),
                ParameterRule::new("state-tracker", "maxHistory", 10.0, 5.0),
            ],
        }
    }
}

/// Apply every matching rule; returns the new nodes and one line per change
pub fn optimize_parameters(nodes: Vec<Node>, limits: &ParameterLimits) -> (Vec<Node>, Vec<String>) {
    let mut changes = Vec::new();

    let nodes = nodes
        .into_iter()
        .map(|mut node| {
            for rule in limits.rules.iter().filter(|r| r.applies_to(&node.kind)) {
                let Some(current) = node.data.param_f64(&rule.field) else {
                    continue;
                };
                if current <= rule.threshold {
                    continue;
                }

                node.data.set_param(&rule.field, number(rule.clamp_to));
                changes.push(format!(
                    "Node {}: {} reduced from {} to {}",
                    node.id,
                    rule.field,
                    display(current),
                    display(rule.clamp_to)
                ));
            }
            node
        })
        .collect();

    (nodes, changes)
}

/// Integral values stay integers in the JSON output
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

fn display(value: f64) -> String {
    number(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamps_memory_store_tokens() {
        let nodes = vec![Node::new("mem", "memory-store")
            .with_param("maxTokens", 8000)
            .with_param("ttl", 60)];

        let (nodes, changes) = optimize_parameters(nodes, &ParameterLimits::default());

        assert_eq!(nodes[0].data.params.get("maxTokens"), Some(&json!(2000)));
        assert_eq!(nodes[0].data.params.get("ttl"), Some(&json!(60)));
        assert_eq!(changes, vec!["Node mem: maxTokens reduced from 8000 to 2000"]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let nodes = vec![
            Node::new("rag", "rag-retriever").with_param("maxResults", 5),
            Node::new("state", "state-tracker").with_param("maxHistory", 11),
        ];

        let (nodes, changes) = optimize_parameters(nodes, &ParameterLimits::default());

        assert_eq!(nodes[0].data.params.get("maxResults"), Some(&json!(5)));
        assert_eq!(nodes[1].data.params.get("maxHistory"), Some(&json!(5)));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_other_types_untouched() {
        let nodes = vec![
            Node::new("llm", "llm").with_param("maxTokens", 9000),
            Node::new("mem", "memory-store").with_param("maxTokens", "lots"),
        ];

        let (out, changes) = optimize_parameters(nodes.clone(), &ParameterLimits::default());
        assert_eq!(out, nodes);
        assert!(changes.is_empty());
    }
}
