//! Persistence for blueprints and optimization results
//!
//! The service reads from `blueprints` and appends to `optimized_blueprints`
//! and `optimization_history`. The two writes are not transactional; a crash
//! between them leaves the history incomplete.

mod memory;
mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

use crate::graph::{Blueprint, Edge, Node};
use crate::metrics::OptimizationMetrics;
use crate::optimization::{OptimizationType, StrategyType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Blueprint {0} not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Row written to `optimized_blueprints`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedBlueprintRecord {
    pub id: Uuid,
    pub blueprint_id: String,
    pub user_id: String,
    pub optimization_type: OptimizationType,
    pub strategies_applied: Vec<StrategyType>,
    pub optimized_nodes: Vec<Node>,
    pub optimized_edges: Vec<Edge>,
    pub before_metrics: OptimizationMetrics,
    pub after_metrics: OptimizationMetrics,
    pub token_savings_percent: f64,
    pub performance_improvement_percent: f64,
    pub created_at: DateTime<Utc>,
}

/// Row appended to `optimization_history`, on success and on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationHistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub blueprint_id: String,
    pub optimization_id: Option<Uuid>,
    pub optimization_type: OptimizationType,
    pub strategies: Vec<String>,
    pub before_metrics: Option<OptimizationMetrics>,
    pub after_metrics: Option<OptimizationMetrics>,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl OptimizationHistoryRecord {
    pub fn failure(
        user_id: &str,
        blueprint_id: &str,
        optimization_type: OptimizationType,
        strategies: Vec<String>,
        error: &str,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            blueprint_id: blueprint_id.to_string(),
            optimization_id: None,
            optimization_type,
            strategies,
            before_metrics: None,
            after_metrics: None,
            success: false,
            error_message: Some(error.to_string()),
            execution_time_ms,
            created_at: Utc::now(),
        }
    }
}

/// Storage backend for the optimizer service
#[async_trait]
pub trait BlueprintStore: Send + Sync {
    /// Fetch a blueprint owned by `user_id`; anything else is `NotFound`
    async fn fetch_blueprint(&self, id: &str, user_id: &str) -> Result<Blueprint, StoreError>;

    async fn insert_optimized(&self, record: &OptimizedBlueprintRecord) -> Result<(), StoreError>;

    async fn insert_history(&self, record: &OptimizationHistoryRecord) -> Result<(), StoreError>;
}
