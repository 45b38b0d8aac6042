//! Blueprint Optimizer - Shrink AI pipeline graphs before they run
//!
//! This library rewrites a stored pipeline blueprint (a graph of LLM, prompt,
//! retrieval and memory nodes) into a cheaper equivalent and reports how much
//! it saved.
//!
//! ## Key Features
//!
//! - **Prompt Compression**: Strip filler phrases and circumlocutions from templates
//! - **Template Consolidation**: Merge near-duplicate prompt templates by word overlap
//! - **Node Pruning**: Drop disconnected nodes and redundant memory stores
//! - **Parameter Clamping**: Cap token budgets, cache TTLs and retrieval sizes
//! - **HTTP Service**: Authenticated endpoint backed by Supabase auth and storage

pub mod auth;
pub mod config;
pub mod graph;
pub mod metrics;
pub mod optimization;
pub mod orchestrator;
pub mod server;
pub mod store;

pub use auth::{AuthError, AuthProvider, StaticTokenAuth, SupabaseAuth};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use graph::{Blueprint, Edge, Node, NodeKind};
pub use metrics::{calculate_metrics, MetricsTracker, OptimizationMetrics};
pub use optimization::{
    BlueprintOptimizer, EdgePolicy, OptimizationConfig, OptimizationType, StrategyType,
};
pub use orchestrator::{
    OptimizationRequest, OptimizationResponse, Orchestrator, OrchestratorError,
};
pub use server::{build_router, AppState};
pub use store::{BlueprintStore, MemoryStore, StoreError, SupabaseStore};
