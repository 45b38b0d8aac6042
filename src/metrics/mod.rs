//! Blueprint metrics and service-level tracking

use crate::graph::{Edge, Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(String),
}

/// Strategy for turning text into a token count
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// `ceil(chars / 4)`, the estimate the service reports
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Exact counts using the cl100k BPE vocabulary
pub struct TiktokenEstimator {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self, EstimatorError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| EstimatorError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Snapshot of a graph, taken before and after optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub total_tokens: usize,
    pub average_prompt_length: f64,
    pub duplicate_templates: usize,
    pub unused_nodes: usize,
}

pub fn calculate_metrics(nodes: &[Node], edges: &[Edge]) -> OptimizationMetrics {
    calculate_metrics_with(&HeuristicEstimator, nodes, edges)
}

pub fn calculate_metrics_with(
    estimator: &dyn TokenEstimator,
    nodes: &[Node],
    edges: &[Edge],
) -> OptimizationMetrics {
    let mut total_tokens = 0;
    let mut prompt_chars = 0;
    let mut prompt_count = 0;
    let mut duplicate_templates = 0;
    let mut seen_templates = HashSet::new();

    for node in nodes {
        if node.is_prompt_template() {
            let template = node.data.template.as_deref().unwrap_or("");
            total_tokens += estimator.estimate(template);
            prompt_chars += template.chars().count();
            prompt_count += 1;

            if !seen_templates.insert(template) {
                duplicate_templates += 1;
            }
        }

        if let Some(description) = &node.data.description {
            total_tokens += estimator.estimate(description);
        }
        if let Some(label) = &node.data.label {
            total_tokens += estimator.estimate(label);
        }
    }

    let sources: HashSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();
    let unused_nodes = nodes
        .iter()
        .filter(|n| n.kind != NodeKind::OutputParser && !sources.contains(n.id.as_str()))
        .count();

    let average_prompt_length = if prompt_count > 0 {
        prompt_chars as f64 / prompt_count as f64
    } else {
        0.0
    };

    OptimizationMetrics {
        node_count: nodes.len(),
        edge_count: edges.len(),
        total_tokens,
        average_prompt_length,
        duplicate_templates,
        unused_nodes,
    }
}

/// Process-wide optimization counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub optimizations_succeeded: u64,
    pub optimizations_failed: u64,
    pub tokens_saved: u64,
    pub nodes_removed: u64,
}

impl ServiceMetrics {
    pub fn record_success(&mut self, before: &OptimizationMetrics, after: &OptimizationMetrics) {
        self.optimizations_succeeded += 1;
        self.tokens_saved += before.total_tokens.saturating_sub(after.total_tokens) as u64;
        self.nodes_removed += before.node_count.saturating_sub(after.node_count) as u64;
    }

    pub fn record_failure(&mut self) {
        self.optimizations_failed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.optimizations_succeeded + self.optimizations_failed;
        if total == 0 {
            return 1.0;
        }
        self.optimizations_succeeded as f64 / total as f64
    }
}

/// Thread-safe metrics tracker
#[derive(Clone, Default)]
pub struct MetricsTracker {
    inner: Arc<Mutex<ServiceMetrics>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, before: &OptimizationMetrics, after: &OptimizationMetrics) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.record_success(before, after);
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.record_failure();
        }
    }

    pub fn get_metrics(&self) -> ServiceMetrics {
        self.inner
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let metrics = self.get_metrics();
        MetricsSummary {
            success_rate: metrics.success_rate(),
            optimizations_succeeded: metrics.optimizations_succeeded,
            optimizations_failed: metrics.optimizations_failed,
            tokens_saved: metrics.tokens_saved,
            nodes_removed: metrics.nodes_removed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub optimizations_succeeded: u64,
    pub optimizations_failed: u64,
    pub success_rate: f64,
    pub tokens_saved: u64,
    pub nodes_removed: u64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Optimizer Summary ===")?;
        writeln!(f, "Optimizations succeeded: {}", self.optimizations_succeeded)?;
        writeln!(f, "Optimizations failed: {}", self.optimizations_failed)?;
        writeln!(f, "Success rate: {:.1}%", self.success_rate * 100.0)?;
        writeln!(f, "Tokens saved: ~{}", self.tokens_saved)?;
        writeln!(f, "Nodes removed: {}", self.nodes_removed)?;
        Ok(())
    }
}

impl std::fmt::Display for OptimizationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Nodes: {}", self.node_count)?;
        writeln!(f, "Edges: {}", self.edge_count)?;
        writeln!(f, "Estimated tokens: {}", self.total_tokens)?;
        writeln!(f, "Average prompt length: {:.1}", self.average_prompt_length)?;
        writeln!(f, "Duplicate templates: {}", self.duplicate_templates)?;
        writeln!(f, "Unused nodes: {}", self.unused_nodes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph_is_all_zero() {
        let metrics = calculate_metrics(&[], &[]);
        assert_eq!(metrics, OptimizationMetrics::default());
        assert_eq!(metrics.average_prompt_length, 0.0);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_metrics_counts_templates_labels_and_unused() {
        let mut out = Node::new("out", "output");
        out.data.description = Some("Final answer shown".to_string());

        let nodes = vec![
            Node::new("in", "input").with_label("Input"),
            Node::new("p1", "prompt-template").with_template("Summarize the text"),
            Node::new("p2", "prompt-template").with_template("Summarize the text"),
            Node::new("parse", "output-parser"),
            out,
        ];
        let edges = vec![Edge::new("in", "p1"), Edge::new("p1", "p2"), Edge::new("p2", "out")];

        let metrics = calculate_metrics(&nodes, &edges);
        assert_eq!(metrics.node_count, 5);
        assert_eq!(metrics.edge_count, 3);
        // 18 chars -> 5 tokens per template and for the description, "Input" -> 2
        assert_eq!(metrics.total_tokens, 17);
        assert_eq!(metrics.average_prompt_length, 18.0);
        assert_eq!(metrics.duplicate_templates, 1);
        // "out" is never a source; output-parser is exempt
        assert_eq!(metrics.unused_nodes, 1);
    }

    #[test]
    fn test_tracker_accumulates() {
        let tracker = MetricsTracker::new();
        let before = OptimizationMetrics {
            node_count: 5,
            total_tokens: 100,
            ..Default::default()
        };
        let after = OptimizationMetrics {
            node_count: 4,
            total_tokens: 70,
            ..Default::default()
        };

        tracker.record_success(&before, &after);
        tracker.record_failure();

        let summary = tracker.summary();
        assert_eq!(summary.tokens_saved, 30);
        assert_eq!(summary.nodes_removed, 1);
        assert_eq!(summary.success_rate, 0.5);
    }
}
