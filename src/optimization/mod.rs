//! Optimization strategies for reducing blueprint token consumption

pub mod compression;
pub mod consolidation;
pub mod parameters;
pub mod pruning;
pub mod splitter;
mod strategies;

pub use compression::{compress_text, compress_text_advanced, CompressionSettings};
pub use consolidation::{consolidate_templates, jaccard_similarity, merge_templates};
pub use parameters::{optimize_parameters, ParameterLimits, ParameterRule};
pub use pruning::prune_nodes;
pub use strategies::{BlueprintOptimizer, OptimizationOutcome};

use crate::metrics::OptimizationMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("Compression task failed: {0}")]
    CompressionTask(String),

    #[error("Unknown optimization type: {0}")]
    UnknownType(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// How hard to push compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationType {
    #[default]
    Auto,
    Aggressive,
    Conservative,
}

impl OptimizationType {
    pub fn compression_level(self) -> f64 {
        match self {
            OptimizationType::Auto => 0.5,
            OptimizationType::Aggressive => 0.8,
            OptimizationType::Conservative => 0.3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationType::Auto => "auto",
            OptimizationType::Aggressive => "aggressive",
            OptimizationType::Conservative => "conservative",
        }
    }
}

impl FromStr for OptimizationType {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(OptimizationType::Auto),
            "aggressive" => Ok(OptimizationType::Aggressive),
            "conservative" => Ok(OptimizationType::Conservative),
            other => Err(OptimizationError::UnknownType(other.to_string())),
        }
    }
}

/// One of the four independent optimization passes.
///
/// Declaration order is the order passes run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Rewrite prompt templates to fewer characters
    TextCompression,
    /// Merge near-duplicate prompt templates
    TemplateConsolidation,
    /// Drop isolated nodes and extra memory stores
    NodePruning,
    /// Clamp oversized node parameters
    ParameterOptimization,
}

impl StrategyType {
    pub const ALL: [StrategyType; 4] = [
        StrategyType::TextCompression,
        StrategyType::TemplateConsolidation,
        StrategyType::NodePruning,
        StrategyType::ParameterOptimization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyType::TextCompression => "text_compression",
            StrategyType::TemplateConsolidation => "template_consolidation",
            StrategyType::NodePruning => "node_pruning",
            StrategyType::ParameterOptimization => "parameter_optimization",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyType {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyType::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| OptimizationError::UnknownStrategy(s.to_string()))
    }
}

/// What to do with edges whose endpoints were consolidated or pruned away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Leave edges untouched; dangling references are reported, not fixed
    #[default]
    Preserve,
    /// Redirect consolidated edges to the surviving node and drop the rest
    Rewire,
}

/// Configuration for the blueprint optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Templates more similar than this are merged
    pub similarity_threshold: f64,
    pub compression: CompressionSettings,
    pub parameter_limits: ParameterLimits,
    pub edge_policy: EdgePolicy,
    /// Weight of token savings in the blended improvement score
    pub token_weight: f64,
    /// Weight of node savings in the blended improvement score
    pub node_weight: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            compression: CompressionSettings::default(),
            parameter_limits: ParameterLimits::default(),
            edge_policy: EdgePolicy::Preserve,
            token_weight: 0.6,
            node_weight: 0.4,
        }
    }
}

/// Derived before/after comparison.
///
/// `performance_improvement_percent` is a weighted blend of token and node
/// savings. It is a placeholder score, not a measured speedup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvements {
    pub token_savings_percent: f64,
    pub node_savings_percent: f64,
    pub performance_improvement_percent: f64,
    pub node_reduction: i64,
    pub details: Vec<String>,
}

impl Improvements {
    pub fn new(
        before: &OptimizationMetrics,
        after: &OptimizationMetrics,
        token_weight: f64,
        node_weight: f64,
    ) -> Self {
        let token_savings = savings_percent(before.total_tokens, after.total_tokens);
        let node_savings = savings_percent(before.node_count, after.node_count);

        Self {
            token_savings_percent: round2(token_savings),
            node_savings_percent: round2(node_savings),
            performance_improvement_percent: round2(
                token_weight * token_savings + node_weight * node_savings,
            ),
            node_reduction: before.node_count as i64 - after.node_count as i64,
            details: Vec::new(),
        }
    }
}

fn savings_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_levels() {
        assert_eq!(OptimizationType::Auto.compression_level(), 0.5);
        assert_eq!(OptimizationType::Aggressive.compression_level(), 0.8);
        assert_eq!(OptimizationType::Conservative.compression_level(), 0.3);
        assert_eq!("Aggressive".parse::<OptimizationType>().unwrap(), OptimizationType::Aggressive);
        assert!("extreme".parse::<OptimizationType>().is_err());
    }

    #[test]
    fn test_strategy_names() {
        for strategy in StrategyType::ALL {
            assert_eq!(strategy.as_str().parse::<StrategyType>().unwrap(), strategy);
        }
        assert!("llm_compress".parse::<StrategyType>().is_err());
    }

    #[test]
    fn test_improvements_blend() {
        let before = OptimizationMetrics {
            node_count: 10,
            total_tokens: 200,
            ..Default::default()
        };
        let after = OptimizationMetrics {
            node_count: 8,
            total_tokens: 150,
            ..Default::default()
        };

        let improvements = Improvements::new(&before, &after, 0.6, 0.4);
        assert_eq!(improvements.token_savings_percent, 25.0);
        assert_eq!(improvements.node_savings_percent, 20.0);
        assert_eq!(improvements.performance_improvement_percent, 23.0);
        assert_eq!(improvements.node_reduction, 2);
    }

    #[test]
    fn test_improvements_on_empty_graph() {
        let empty = OptimizationMetrics::default();
        let improvements = Improvements::new(&empty, &empty, 0.6, 0.4);
        assert_eq!(improvements.token_savings_percent, 0.0);
        assert_eq!(improvements.performance_improvement_percent, 0.0);
    }
}
