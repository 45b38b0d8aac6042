//! Request orchestration for blueprint optimization
//!
//! One request, one response, no intermediate state:
//! - authenticate the caller
//! - fetch the blueprint (scoped to the caller)
//! - run the requested strategies
//! - persist the optimized copy and a history row
//!
//! Failures after authentication, an unreadable body included, get a
//! best-effort history row.

use crate::auth::{AuthError, AuthProvider, UserId};
use crate::graph::{Edge, Node};
use crate::metrics::{MetricsTracker, OptimizationMetrics};
use crate::optimization::{
    BlueprintOptimizer, Improvements, OptimizationError, OptimizationType, StrategyType,
};
use crate::store::{
    BlueprintStore, OptimizationHistoryRecord, OptimizedBlueprintRecord, StoreError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid request body: {0}")]
    BadRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),
}

/// Body of an optimization request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub blueprint_id: String,

    #[serde(default)]
    pub optimization_type: OptimizationType,

    /// Strategy names; unknown names are ignored
    #[serde(default)]
    pub strategies: Vec<String>,
}

impl OptimizationRequest {
    /// Known strategies in the request, unknown ones logged and dropped
    pub fn parsed_strategies(&self) -> Vec<StrategyType> {
        self.strategies
            .iter()
            .filter_map(|name| match name.parse() {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    warn!("Ignoring strategy: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Whatever can be read from a body that did not parse as a request
    fn salvage(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or_default();

        Self {
            blueprint_id: value
                .get("blueprintId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            optimization_type: value
                .get("optimizationType")
                .and_then(Value::as_str)
                .and_then(|name| name.parse().ok())
                .unwrap_or_default(),
            strategies: value
                .get("strategies")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Successful optimization payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResponse {
    pub success: bool,
    pub optimization_id: Uuid,
    pub strategies_applied: Vec<StrategyType>,
    pub before_metrics: OptimizationMetrics,
    pub after_metrics: OptimizationMetrics,
    pub improvements: Improvements,
    pub optimized_nodes: Vec<Node>,
    pub optimized_edges: Vec<Edge>,
    pub pruned_count: usize,
    pub optimizations: Vec<String>,
    /// Milliseconds
    pub execution_time: u64,
}

/// Coordinates auth, storage and the optimizer for one request at a time
pub struct Orchestrator {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn BlueprintStore>,
    optimizer: BlueprintOptimizer,
    metrics: MetricsTracker,
}

impl Orchestrator {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn BlueprintStore>,
        optimizer: BlueprintOptimizer,
        metrics: MetricsTracker,
    ) -> Self {
        Self {
            auth,
            store,
            optimizer,
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    /// Authenticate, then parse and run the request.
    ///
    /// Nothing is read from or written to the store unless the token checks out.
    pub async fn handle(
        &self,
        token: Option<&str>,
        body: &[u8],
    ) -> Result<OptimizationResponse, OrchestratorError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let user_id = self.auth.verify(token).await?;

        match serde_json::from_slice::<OptimizationRequest>(body) {
            Ok(request) => self.optimize(&user_id, request).await,
            Err(e) => {
                let request = OptimizationRequest::salvage(body);
                Err(self.fail(&user_id, &request, e.into(), Instant::now()).await)
            }
        }
    }

    /// Run an optimization for an already authenticated user
    pub async fn optimize(
        &self,
        user_id: &UserId,
        request: OptimizationRequest,
    ) -> Result<OptimizationResponse, OrchestratorError> {
        let started = Instant::now();

        match self.run(user_id, &request, started).await {
            Ok(response) => Ok(response),
            Err(e) => Err(self.fail(user_id, &request, e, started).await),
        }
    }

    /// Count the failure and leave a best-effort history row; returns `error`
    async fn fail(
        &self,
        user_id: &str,
        request: &OptimizationRequest,
        error: OrchestratorError,
        started: Instant,
    ) -> OrchestratorError {
        self.metrics.record_failure();
        warn!("Optimization of {:?} failed: {}", request.blueprint_id, error);

        if let Err(log_err) = self
            .record_failure(user_id, request, &error, elapsed_ms(started))
            .await
        {
            warn!(
                "Could not record failure history for {:?}: {}",
                request.blueprint_id, log_err
            );
        }
        error
    }

    async fn run(
        &self,
        user_id: &str,
        request: &OptimizationRequest,
        started: Instant,
    ) -> Result<OptimizationResponse, OrchestratorError> {
        let blueprint = self
            .store
            .fetch_blueprint(&request.blueprint_id, user_id)
            .await?;

        let strategies = request.parsed_strategies();
        info!(
            "Optimizing blueprint {} ({}) with {:?}",
            blueprint.id,
            request.optimization_type.as_str(),
            strategies
        );

        let outcome = self
            .optimizer
            .optimize(
                blueprint.nodes,
                blueprint.edges,
                request.optimization_type,
                &strategies,
            )
            .await?;

        let optimization_id = Uuid::new_v4();
        let record = OptimizedBlueprintRecord {
            id: optimization_id,
            blueprint_id: request.blueprint_id.clone(),
            user_id: user_id.to_string(),
            optimization_type: request.optimization_type,
            strategies_applied: outcome.strategies_applied.clone(),
            optimized_nodes: outcome.nodes.clone(),
            optimized_edges: outcome.edges.clone(),
            before_metrics: outcome.before.clone(),
            after_metrics: outcome.after.clone(),
            token_savings_percent: outcome.improvements.token_savings_percent,
            performance_improvement_percent: outcome.improvements.performance_improvement_percent,
            created_at: Utc::now(),
        };
        self.store.insert_optimized(&record).await?;

        let execution_time = elapsed_ms(started);
        let history = OptimizationHistoryRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            blueprint_id: request.blueprint_id.clone(),
            optimization_id: Some(optimization_id),
            optimization_type: request.optimization_type,
            strategies: request.strategies.clone(),
            before_metrics: Some(outcome.before.clone()),
            after_metrics: Some(outcome.after.clone()),
            success: true,
            error_message: None,
            execution_time_ms: execution_time,
            created_at: Utc::now(),
        };
        // The optimized record is already stored; a missing audit row is tolerated
        if let Err(e) = self.store.insert_history(&history).await {
            warn!("Could not record history for {}: {}", optimization_id, e);
        }

        self.metrics.record_success(&outcome.before, &outcome.after);

        Ok(OptimizationResponse {
            success: true,
            optimization_id,
            strategies_applied: outcome.strategies_applied,
            before_metrics: outcome.before,
            after_metrics: outcome.after,
            improvements: outcome.improvements,
            optimized_nodes: outcome.nodes,
            optimized_edges: outcome.edges,
            pruned_count: outcome.pruned_count,
            optimizations: outcome.optimizations,
            execution_time,
        })
    }

    async fn record_failure(
        &self,
        user_id: &str,
        request: &OptimizationRequest,
        error: &OrchestratorError,
        execution_time_ms: u64,
    ) -> Result<(), StoreError> {
        let record = OptimizationHistoryRecord::failure(
            user_id,
            &request.blueprint_id,
            request.optimization_type,
            request.strategies.clone(),
            &error.to_string(),
            execution_time_ms,
        );
        self.store.insert_history(&record).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuth;
    use crate::graph::Blueprint;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn setup() -> (Orchestrator, MemoryStore) {
        let store = MemoryStore::new();
        store
            .insert_blueprint(Blueprint {
                id: "bp-1".to_string(),
                user_id: "alice".to_string(),
                name: Some("Support bot".to_string()),
                nodes: vec![
                    Node::new("in", "input"),
                    Node::new("p1", "prompt-template")
                        .with_template("Please kindly summarize this document for the user"),
                    Node::new("p2", "prompt-template")
                        .with_template("Summarize this document for the user"),
                    Node::new("mem", "memory-store").with_param("maxTokens", 8000),
                    Node::new("orphan", "processor"),
                    Node::new("out", "output"),
                ],
                edges: vec![
                    Edge::new("in", "p1"),
                    Edge::new("p1", "mem"),
                    Edge::new("p2", "mem"),
                    Edge::new("mem", "out"),
                ],
            })
            .await;

        let auth = StaticTokenAuth::new()
            .with_token("alice-token", "alice")
            .with_token("bob-token", "bob");

        let orchestrator = Orchestrator::new(
            Arc::new(auth),
            Arc::new(store.clone()),
            BlueprintOptimizer::default(),
            MetricsTracker::new(),
        );
        (orchestrator, store)
    }

    fn body(strategies: &[&str]) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "blueprintId": "bp-1",
            "optimizationType": "auto",
            "strategies": strategies,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_consolidation_scenario() {
        let (orchestrator, store) = setup().await;
        let response = orchestrator
            .handle(Some("alice-token"), &body(&["template_consolidation"]))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.optimized_nodes.len(), 5);
        assert_eq!(
            response
                .optimized_nodes
                .iter()
                .filter(|n| n.is_prompt_template())
                .count(),
            1
        );
        assert_eq!(store.optimized_records().await.len(), 1);

        let history = store.history_records().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].optimization_id, Some(response.optimization_id));
    }

    #[tokio::test]
    async fn test_pruning_and_parameter_scenarios() {
        let (orchestrator, _) = setup().await;
        let response = orchestrator
            .handle(
                Some("alice-token"),
                &body(&["node_pruning", "parameter_optimization"]),
            )
            .await
            .unwrap();

        assert!(response.optimized_nodes.iter().all(|n| n.id != "orphan"));
        assert!(response.pruned_count >= 1);

        let mem = response
            .optimized_nodes
            .iter()
            .find(|n| n.id == "mem")
            .unwrap();
        assert_eq!(mem.data.params.get("maxTokens"), Some(&json!(2000)));
        assert!(response.optimizations.iter().any(|o| o.contains("mem")));
    }

    #[tokio::test]
    async fn test_empty_strategies_leave_graph_unchanged() {
        let (orchestrator, store) = setup().await;
        let original = store.fetch_blueprint("bp-1", "alice").await.unwrap();

        let response = orchestrator
            .handle(Some("alice-token"), &body(&[]))
            .await
            .unwrap();

        assert_eq!(response.optimized_nodes, original.nodes);
        assert_eq!(response.optimized_edges, original.edges);
        assert!(response.strategies_applied.is_empty());
        assert_eq!(response.improvements.token_savings_percent, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_strategies_are_ignored() {
        let (orchestrator, _) = setup().await;
        let response = orchestrator
            .handle(Some("alice-token"), &body(&["teleportation", "node_pruning"]))
            .await
            .unwrap();
        assert_eq!(response.strategies_applied, vec![StrategyType::NodePruning]);
    }

    #[tokio::test]
    async fn test_missing_token_touches_nothing() {
        let (orchestrator, store) = setup().await;
        let err = orchestrator
            .handle(None, &body(&["node_pruning"]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Auth(AuthError::MissingToken)));
        assert!(store.optimized_records().await.is_empty());
        assert!(store.history_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_blueprint_records_failure() {
        let (orchestrator, store) = setup().await;
        let err = orchestrator
            .handle(Some("bob-token"), &body(&["node_pruning"]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Store(StoreError::NotFound(_))));
        assert!(store.optimized_records().await.is_empty());

        let history = store.history_records().await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].user_id, "bob");
        assert_eq!(orchestrator.metrics().get_metrics().optimizations_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_failure_logging_keeps_original_error() {
        let (orchestrator, store) = setup().await;
        store.set_fail_writes(true);

        let err = orchestrator
            .handle(Some("alice-token"), &body(&["node_pruning"]))
            .await
            .unwrap_err();

        // insert_optimized failed; the history write failed too and was only logged
        assert!(matches!(err, OrchestratorError::Store(StoreError::Backend(_))));
        assert!(store.history_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_records_failure() {
        let (orchestrator, store) = setup().await;
        let err = orchestrator
            .handle(
                Some("alice-token"),
                br#"{"blueprintId":"bp-1","strategies":"node_pruning"}"#,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::BadRequest(_)));
        assert!(store.optimized_records().await.is_empty());

        let history = store.history_records().await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].blueprint_id, "bp-1");
        assert_eq!(history[0].user_id, "alice");
        assert_eq!(orchestrator.metrics().get_metrics().optimizations_failed, 1);
    }

    #[tokio::test]
    async fn test_unparsable_body_still_logged() {
        let (orchestrator, store) = setup().await;
        let err = orchestrator
            .handle(Some("alice-token"), b"{not json")
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::BadRequest(_)));
        let history = store.history_records().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].blueprint_id, "");
        assert!(history[0].error_message.is_some());
    }
}
