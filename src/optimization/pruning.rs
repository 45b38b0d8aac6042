//! Node pruning: isolated nodes and redundant memory stores

use super::EdgePolicy;
use crate::graph::{Edge, Node, NodeKind};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub pruned_count: usize,
    pub details: Vec<String>,
}

/// Remove nodes no edge touches, then every memory store after the first.
///
/// A node counts as connected if it is the source or the target of any edge,
/// so sinks with only inbound edges survive. Edges of removed memory stores
/// are always dropped; with [`EdgePolicy::Rewire`] any other edge left
/// pointing at a missing node is dropped as well.
pub fn prune_nodes(nodes: Vec<Node>, edges: Vec<Edge>, policy: EdgePolicy) -> PruneOutcome {
    let mut details = Vec::new();

    let connected: HashSet<&str> = edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();

    let mut removed: HashSet<String> = HashSet::new();
    let mut seen_memory_store = false;

    for node in &nodes {
        if !connected.contains(node.id.as_str()) {
            details.push(format!("Removed isolated node {}", node.id));
            removed.insert(node.id.clone());
            continue;
        }

        if node.kind == NodeKind::MemoryStore {
            if seen_memory_store {
                details.push(format!("Removed redundant memory store {}", node.id));
                removed.insert(node.id.clone());
            } else {
                seen_memory_store = true;
            }
        }
    }

    if removed.is_empty() && policy == EdgePolicy::Preserve {
        return PruneOutcome {
            nodes,
            edges,
            pruned_count: 0,
            details,
        };
    }

    let nodes: Vec<Node> = nodes
        .into_iter()
        .filter(|n| !removed.contains(&n.id))
        .collect();

    let edges: Vec<Edge> = match policy {
        EdgePolicy::Preserve => edges
            .into_iter()
            .filter(|e| !removed.contains(&e.source) && !removed.contains(&e.target))
            .collect(),
        EdgePolicy::Rewire => {
            let live: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            edges
                .into_iter()
                .filter(|e| live.contains(e.source.as_str()) && live.contains(e.target.as_str()))
                .collect()
        }
    };

    debug!("Pruned {} nodes", removed.len());

    PruneOutcome {
        nodes,
        edges,
        pruned_count: removed.len(),
        details,
    }
}
