//! Near-duplicate prompt template consolidation
//!
//! Pairwise comparison is O(n²) over prompt-template nodes. Fine for editor
//! sized graphs (dozens of nodes), not for bulk use.

use super::EdgePolicy;
use crate::graph::{Edge, Node};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Result of a consolidation pass
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// `(surviving id, removed id)` pairs in merge order
    pub merges: Vec<(String, String)>,
    pub details: Vec<String>,
}

/// Jaccard index over lowercase whitespace-separated word sets.
///
/// Two empty texts are identical (1.0).
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let words_a: HashSet<&str> = a_lower.split_whitespace().collect();
    let words_b: HashSet<&str> = b_lower.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count();

    intersection as f64 / union as f64
}

/// Keep `shorter` verbatim and append the words of `longer` it lacks.
///
/// Appended words follow their first occurrence in `longer`, lowercased, so
/// the merged text is not guaranteed to read naturally.
pub fn merge_templates(shorter: &str, longer: &str) -> String {
    let shorter_lower = shorter.to_lowercase();
    let longer_lower = longer.to_lowercase();
    let mut known: HashSet<&str> = shorter_lower.split_whitespace().collect();

    let extra: Vec<&str> = longer_lower
        .split_whitespace()
        .filter(|word| known.insert(*word))
        .collect();

    if extra.is_empty() {
        return shorter.to_string();
    }
    if shorter.trim().is_empty() {
        return extra.join(" ");
    }
    format!("{} {}", shorter, extra.join(" "))
}

pub fn consolidate_templates(
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    threshold: f64,
    policy: EdgePolicy,
) -> ConsolidationOutcome {
    let mut nodes = nodes;
    let mut removed: HashSet<usize> = HashSet::new();
    let mut merges = Vec::new();
    let mut details = Vec::new();

    let candidates: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_prompt_template() && n.data.template.is_some())
        .map(|(idx, _)| idx)
        .collect();

    for (pos, &i) in candidates.iter().enumerate() {
        if removed.contains(&i) {
            continue;
        }

        for &j in &candidates[pos + 1..] {
            if removed.contains(&j) {
                continue;
            }

            let template_i = nodes[i].data.template.clone().unwrap_or_default();
            let template_j = nodes[j].data.template.clone().unwrap_or_default();
            let similarity = jaccard_similarity(&template_i, &template_j);
            if similarity <= threshold {
                continue;
            }

            let merged = if template_j.chars().count() < template_i.chars().count() {
                merge_templates(&template_j, &template_i)
            } else {
                merge_templates(&template_i, &template_j)
            };

            let extra_vars: Vec<String> = nodes[j]
                .data
                .variables
                .iter()
                .filter(|v| !nodes[i].data.variables.contains(v))
                .cloned()
                .collect();

            let survivor = &mut nodes[i];
            survivor.data.template = Some(merged);
            survivor.data.variables.extend(extra_vars);

            debug!(
                "Merged template {} into {} (similarity {:.2})",
                nodes[j].id, nodes[i].id, similarity
            );
            details.push(format!(
                "Merged template node {} into {} ({:.0}% similar)",
                nodes[j].id,
                nodes[i].id,
                similarity * 100.0
            ));
            merges.push((nodes[i].id.clone(), nodes[j].id.clone()));
            removed.insert(j);
        }
    }

    let nodes: Vec<Node> = nodes
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, node)| node)
        .collect();

    let edges = match policy {
        EdgePolicy::Preserve => edges,
        EdgePolicy::Rewire => rewire_edges(edges, &merges),
    };

    ConsolidationOutcome {
        nodes,
        edges,
        merges,
        details,
    }
}

/// Point edges at surviving nodes, dropping self-loops and duplicates this creates
fn rewire_edges(edges: Vec<Edge>, merges: &[(String, String)]) -> Vec<Edge> {
    if merges.is_empty() {
        return edges;
    }

    let redirect: HashMap<&str, &str> = merges
        .iter()
        .map(|(kept, gone)| (gone.as_str(), kept.as_str()))
        .collect();

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(edges.len());

    for mut edge in edges {
        let rewired = redirect.contains_key(edge.source.as_str())
            || redirect.contains_key(edge.target.as_str());

        if let Some(kept) = redirect.get(edge.source.as_str()) {
            edge.source = kept.to_string();
        }
        if let Some(kept) = redirect.get(edge.target.as_str()) {
            edge.target = kept.to_string();
        }

        if rewired {
            if edge.source == edge.target {
                continue;
            }
            if !seen.insert((edge.source.clone(), edge.target.clone())) {
                continue;
            }
        } else {
            seen.insert((edge.source.clone(), edge.target.clone()));
        }

        result.push(edge);
    }

    result
}
