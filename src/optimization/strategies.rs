//! Blueprint optimizer that runs the requested passes in a fixed order

use super::{
    compress_text_advanced, consolidate_templates, optimize_parameters, prune_nodes, EdgePolicy,
    Improvements, OptimizationConfig, OptimizationError, OptimizationType, StrategyType,
};
use crate::graph::{dangling_edge_count, Edge, Node};
use crate::metrics::{calculate_metrics, OptimizationMetrics};
use futures_util::future::join_all;
use tracing::{debug, info};

/// Everything produced by one optimizer run
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub strategies_applied: Vec<StrategyType>,
    pub before: OptimizationMetrics,
    pub after: OptimizationMetrics,
    pub improvements: Improvements,
    pub pruned_count: usize,
    /// Parameter clamps, one line each
    pub optimizations: Vec<String>,
}

/// Applies optimization strategies to a pipeline graph
pub struct BlueprintOptimizer {
    config: OptimizationConfig,
}

impl BlueprintOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Optimize a graph with the given strategies.
    ///
    /// Strategies always run in declaration order of [`StrategyType`],
    /// regardless of the order requested; duplicates are ignored.
    pub async fn optimize(
        &self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        optimization_type: OptimizationType,
        strategies: &[StrategyType],
    ) -> Result<OptimizationOutcome, OptimizationError> {
        let before = calculate_metrics(&nodes, &edges);
        let mut nodes = nodes;
        let mut edges = edges;
        let mut applied = Vec::new();
        let mut details = Vec::new();
        let mut pruned_count = 0;
        let mut optimizations = Vec::new();

        for strategy in StrategyType::ALL {
            if !strategies.contains(&strategy) {
                continue;
            }
            debug!("Applying {}", strategy);

            match strategy {
                StrategyType::TextCompression => {
                    let level = optimization_type.compression_level();
                    let (compressed, summary) = self.compress_nodes(nodes, level).await?;
                    nodes = compressed;
                    details.extend(summary);
                }
                StrategyType::TemplateConsolidation => {
                    let outcome = consolidate_templates(
                        nodes,
                        edges,
                        self.config.similarity_threshold,
                        self.config.edge_policy,
                    );
                    nodes = outcome.nodes;
                    edges = outcome.edges;
                    details.extend(outcome.details);
                }
                StrategyType::NodePruning => {
                    let outcome = prune_nodes(nodes, edges, self.config.edge_policy);
                    nodes = outcome.nodes;
                    edges = outcome.edges;
                    pruned_count = outcome.pruned_count;
                    details.extend(outcome.details);
                }
                StrategyType::ParameterOptimization => {
                    let (tuned, changes) = optimize_parameters(nodes, &self.config.parameter_limits);
                    nodes = tuned;
                    details.extend(changes.iter().cloned());
                    optimizations = changes;
                }
            }

            applied.push(strategy);
        }

        if self.config.edge_policy == EdgePolicy::Preserve {
            let dangling = dangling_edge_count(&nodes, &edges);
            if dangling > 0 {
                details.push(format!(
                    "{} edge(s) reference nodes that no longer exist",
                    dangling
                ));
            }
        }

        let after = calculate_metrics(&nodes, &edges);
        let mut improvements =
            Improvements::new(&before, &after, self.config.token_weight, self.config.node_weight);
        improvements.details = details;

        info!(
            "Optimized graph: {} -> {} nodes, {} -> {} tokens",
            before.node_count, after.node_count, before.total_tokens, after.total_tokens
        );

        Ok(OptimizationOutcome {
            nodes,
            edges,
            strategies_applied: applied,
            before,
            after,
            improvements,
            pruned_count,
            optimizations,
        })
    }

    /// Compress every prompt template concurrently, keeping node order
    async fn compress_nodes(
        &self,
        nodes: Vec<Node>,
        level: f64,
    ) -> Result<(Vec<Node>, Vec<String>), OptimizationError> {
        let tasks = nodes.into_iter().map(|mut node| {
            let settings = self.config.compression.clone();
            tokio::task::spawn_blocking(move || {
                let mut saved = 0;
                if node.is_prompt_template() {
                    if let Some(template) = node.data.template.take() {
                        let compressed = compress_text_advanced(&template, level, &settings);
                        saved = template.len().saturating_sub(compressed.len());
                        node.data.template = Some(compressed);
                    }
                }
                (node, saved)
            })
        });

        let mut compressed = Vec::new();
        let mut touched = 0;
        let mut chars_saved = 0;

        for result in join_all(tasks).await {
            let (node, saved) =
                result.map_err(|e| OptimizationError::CompressionTask(e.to_string()))?;
            if saved > 0 {
                touched += 1;
                chars_saved += saved;
            }
            compressed.push(node);
        }

        let mut summary = Vec::new();
        if touched > 0 {
            summary.push(format!(
                "Compressed {} prompt template(s), {} characters removed",
                touched, chars_saved
            ));
        }

        Ok((compressed, summary))
    }
}

impl Default for BlueprintOptimizer {
    fn default() -> Self {
        Self::new(OptimizationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> (Vec<Node>, Vec<Edge>) {
        let nodes = vec![
            Node::new("in", "input").with_label("User input"),
            Node::new("p1", "prompt-template")
                .with_template("Please kindly summarize this document for the user"),
            Node::new("p2", "prompt-template").with_template("Summarize this document for the user"),
            Node::new("mem", "memory-store").with_param("maxTokens", 8000),
            Node::new("orphan", "processor"),
            Node::new("out", "output"),
        ];
        let edges = vec![
            Edge::new("in", "p1"),
            Edge::new("p1", "p2"),
            Edge::new("p2", "mem"),
            Edge::new("mem", "out"),
        ];
        (nodes, edges)
    }

    #[tokio::test]
    async fn test_no_strategies_is_identity() {
        let (nodes, edges) = pipeline();
        let outcome = BlueprintOptimizer::default()
            .optimize(nodes.clone(), edges.clone(), OptimizationType::Auto, &[])
            .await
            .unwrap();

        assert_eq!(outcome.nodes, nodes);
        assert_eq!(outcome.edges, edges);
        assert!(outcome.strategies_applied.is_empty());
        assert_eq!(outcome.improvements.token_savings_percent, 0.0);
        assert_eq!(outcome.before, outcome.after);
    }

    #[tokio::test]
    async fn test_consolidation_removes_one_template() {
        let (nodes, edges) = pipeline();
        let outcome = BlueprintOptimizer::default()
            .optimize(
                nodes.clone(),
                edges,
                OptimizationType::Auto,
                &[StrategyType::TemplateConsolidation],
            )
            .await
            .unwrap();

        assert_eq!(outcome.nodes.len(), nodes.len() - 1);
        assert_eq!(outcome.nodes.iter().filter(|n| n.is_prompt_template()).count(), 1);
        // p1 -> p2 and p2 -> mem now dangle
        assert!(outcome
            .improvements
            .details
            .iter()
            .any(|d| d.starts_with("2 edge(s)")));
    }

    #[tokio::test]
    async fn test_pruning_and_parameters() {
        let (nodes, edges) = pipeline();
        let outcome = BlueprintOptimizer::default()
            .optimize(
                nodes,
                edges,
                OptimizationType::Conservative,
                &[StrategyType::ParameterOptimization, StrategyType::NodePruning],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.strategies_applied,
            vec![StrategyType::NodePruning, StrategyType::ParameterOptimization]
        );
        assert!(outcome.nodes.iter().all(|n| n.id != "orphan"));
        assert!(outcome.pruned_count >= 1);

        let mem = outcome.nodes.iter().find(|n| n.id == "mem").unwrap();
        assert_eq!(mem.data.param_f64("maxTokens"), Some(2000.0));
        assert!(outcome.optimizations.iter().any(|o| o.contains("mem")));
    }

    #[tokio::test]
    async fn test_compression_keeps_order_and_shrinks() {
        let (nodes, edges) = pipeline();
        let outcome = BlueprintOptimizer::default()
            .optimize(
                nodes.clone(),
                edges,
                OptimizationType::Aggressive,
                &[StrategyType::TextCompression],
            )
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.nodes.iter().map(|n| n.id.as_str()).collect();
        let original_ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, original_ids);
        assert_eq!(
            outcome.nodes[1].data.template.as_deref(),
            Some("summarize this document for the user")
        );
        assert!(outcome.after.total_tokens < outcome.before.total_tokens);
        assert!(outcome.improvements.token_savings_percent > 0.0);
    }

    #[test]
    fn test_rewire_policy_leaves_no_dangling_edges() {
        let config = OptimizationConfig {
            edge_policy: EdgePolicy::Rewire,
            ..Default::default()
        };
        let (nodes, edges) = pipeline();

        let outcome = tokio_test::block_on(BlueprintOptimizer::new(config).optimize(
            nodes,
            edges,
            OptimizationType::Auto,
            &StrategyType::ALL,
        ))
        .unwrap();

        assert_eq!(dangling_edge_count(&outcome.nodes, &outcome.edges), 0);
        assert!(outcome.edges.iter().any(|e| e.source == "p1" && e.target == "mem"));
    }
}
