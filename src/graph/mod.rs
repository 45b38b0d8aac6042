//! Pipeline graph data model
//!
//! Blueprints are produced by the visual editor, so nodes and edges carry
//! editor-specific fields (positions, handles, styling) that the optimizer
//! never interprets. Those fields are kept in passthrough maps and written
//! back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Type of a pipeline node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Input,
    Llm,
    PromptTemplate,
    RagRetriever,
    MemoryStore,
    StateTracker,
    Processor,
    Output,
    OutputParser,
    /// Any type the optimizer has no rules for
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Llm => "llm",
            NodeKind::PromptTemplate => "prompt-template",
            NodeKind::RagRetriever => "rag-retriever",
            NodeKind::MemoryStore => "memory-store",
            NodeKind::StateTracker => "state-tracker",
            NodeKind::Processor => "processor",
            NodeKind::Output => "output",
            NodeKind::OutputParser => "output-parser",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "input" => NodeKind::Input,
            "llm" => NodeKind::Llm,
            "prompt-template" => NodeKind::PromptTemplate,
            "rag-retriever" => NodeKind::RagRetriever,
            "memory-store" => NodeKind::MemoryStore,
            "state-tracker" => NodeKind::StateTracker,
            "processor" => NodeKind::Processor,
            "output" => NodeKind::Output,
            "output-parser" => NodeKind::OutputParser,
            _ => NodeKind::Other(value),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(value: &str) -> Self {
        NodeKind::from(value.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Prompt text (prompt-template nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Template variables (prompt-template nodes)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,

    /// Numeric parameters and anything else the editor stores
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl NodeData {
    /// Read a numeric parameter
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    pub fn set_param(&mut self, key: &str, value: impl Into<Value>) {
        self.params.insert(key.to_string(), value.into());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    #[serde(default)]
    pub data: NodeData,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data: NodeData::default(),
            extra: Map::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.data.template = Some(template.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.set_param(key, value);
        self
    }

    pub fn is_prompt_template(&self) -> bool {
        self.kind == NodeKind::PromptTemplate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub source: String,

    pub target: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: Some(format!("{}-{}", source, target)),
            source,
            target,
            extra: Map::new(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// A stored pipeline graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: String,

    #[serde(alias = "user_id")]
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Count edges whose source or target names a node that does not exist
pub fn dangling_edge_count(nodes: &[Node], edges: &[Edge]) -> usize {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    edges
        .iter()
        .filter(|e| !ids.contains(e.source.as_str()) || !ids.contains(e.target.as_str()))
        .count()
}
