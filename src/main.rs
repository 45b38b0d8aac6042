//! Blueprint Optimizer CLI - Serve and run the pipeline graph optimizer

use anyhow::{bail, Context, Result};
use blueprint_optimizer::{
    auth::{AuthProvider, StaticTokenAuth, SupabaseAuth},
    config::Config,
    graph::{Blueprint, Edge, Node},
    metrics::{calculate_metrics, calculate_metrics_with, MetricsTracker, TiktokenEstimator},
    optimization::{BlueprintOptimizer, OptimizationType, StrategyType},
    orchestrator::Orchestrator,
    server::{build_router, AppState},
    store::{BlueprintStore, MemoryStore, SupabaseStore},
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "blueprint-optimizer")]
#[command(about = "Optimize AI pipeline blueprints for token usage and graph size")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP optimizer service
    Serve {
        /// Accept this bearer token and use an in-memory store instead of Supabase
        #[arg(long)]
        dev_token: Option<String>,

        /// JSON array of blueprints to load into the in-memory store
        #[arg(long, requires = "dev_token")]
        seed: Option<PathBuf>,

        /// Listen address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Optimize a blueprint file locally
    Optimize {
        /// Blueprint JSON file (needs `nodes` and `edges`)
        #[arg(short, long)]
        input: PathBuf,

        /// Optimization intensity (auto, aggressive, conservative)
        #[arg(short = 't', long = "type", default_value = "auto")]
        optimization_type: OptimizationType,

        /// Strategies to apply (default: all)
        #[arg(short, long = "strategy")]
        strategies: Vec<StrategyType>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show metrics for a blueprint file
    Metrics {
        /// Blueprint JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Count tokens with the cl100k tokenizer instead of the estimate
        #[arg(long)]
        exact: bool,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show {
        /// Show only specific section (server, supabase, optimization)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

/// Any JSON document with `nodes` and `edges`, blueprint rows included
#[derive(Deserialize)]
struct GraphFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            dev_token,
            seed,
            bind,
        } => {
            run_serve(dev_token, seed, bind).await?;
        }
        Commands::Optimize {
            input,
            optimization_type,
            strategies,
            output,
        } => {
            run_optimize(input, optimization_type, strategies, output).await?;
        }
        Commands::Metrics { input, exact } => {
            show_metrics(input, exact).await?;
        }
        Commands::Config(cmd) => {
            run_config_command(cmd)?;
        }
    }

    Ok(())
}

async fn run_serve(
    dev_token: Option<String>,
    seed: Option<PathBuf>,
    bind: Option<String>,
) -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let (auth, store): (Arc<dyn AuthProvider>, Arc<dyn BlueprintStore>) = match dev_token {
        Some(token) => {
            warn!("Development mode: static token auth with in-memory store");
            let store = MemoryStore::new();
            if let Some(path) = seed {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading seed file {}", path.display()))?;
                let blueprints: Vec<Blueprint> = serde_json::from_str(&content)?;
                info!("Seeded {} blueprint(s) from {}", blueprints.len(), path.display());
                for blueprint in blueprints {
                    store.insert_blueprint(blueprint).await;
                }
            }
            (
                Arc::new(StaticTokenAuth::new().with_token(token, "dev-user")),
                Arc::new(store),
            )
        }
        None => {
            config.validate_supabase()?;
            let supabase = &config.supabase;
            let url = supabase.url.clone().unwrap_or_default();
            (
                Arc::new(SupabaseAuth::new(
                    url.clone(),
                    supabase.anon_key.clone().unwrap_or_default(),
                )),
                Arc::new(SupabaseStore::new(
                    url,
                    supabase.service_role_key.clone().unwrap_or_default(),
                )),
            )
        }
    };

    let orchestrator = Orchestrator::new(
        auth,
        store,
        BlueprintOptimizer::new(config.optimization.clone()),
        MetricsTracker::new(),
    );
    let app = build_router(AppState::new(orchestrator));

    let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn read_graph(path: &Path) -> Result<GraphFile> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let graph: GraphFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(graph)
}

async fn run_optimize(
    input: PathBuf,
    optimization_type: OptimizationType,
    strategies: Vec<StrategyType>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let strategies = if strategies.is_empty() {
        StrategyType::ALL.to_vec()
    } else {
        strategies
    };
    info!(
        "Optimizing {} ({}) with {} strategies",
        input.display(),
        optimization_type.as_str(),
        strategies.len()
    );

    let graph = read_graph(&input).await?;
    let optimizer = BlueprintOptimizer::new(config.optimization);
    let outcome = optimizer
        .optimize(graph.nodes, graph.edges, optimization_type, &strategies)
        .await?;

    let result = serde_json::to_string_pretty(&json!({
        "nodes": outcome.nodes,
        "edges": outcome.edges,
    }))?;

    if let Some(path) = output {
        tokio::fs::write(&path, &result).await?;
        println!("Optimized blueprint written to: {}", path.display());
    } else {
        println!("{}", result);
    }

    let applied: Vec<&str> = outcome.strategies_applied.iter().map(|s| s.as_str()).collect();

    println!("\n--- Optimization Stats ---");
    println!(
        "Nodes: {} -> {} ({} pruned)",
        outcome.before.node_count, outcome.after.node_count, outcome.pruned_count
    );
    println!(
        "Estimated tokens: {} -> {}",
        outcome.before.total_tokens, outcome.after.total_tokens
    );
    println!(
        "Token savings: {:.2}%",
        outcome.improvements.token_savings_percent
    );
    println!(
        "Node savings: {:.2}%",
        outcome.improvements.node_savings_percent
    );
    println!(
        "Performance improvement: {:.2}%",
        outcome.improvements.performance_improvement_percent
    );
    println!("Strategies applied: {}", applied.join(", "));
    for detail in &outcome.improvements.details {
        println!("  - {}", detail);
    }

    Ok(())
}

async fn show_metrics(input: PathBuf, exact: bool) -> Result<()> {
    let graph = read_graph(&input).await?;

    let metrics = if exact {
        let estimator = TiktokenEstimator::new()?;
        calculate_metrics_with(&estimator, &graph.nodes, &graph.edges)
    } else {
        calculate_metrics(&graph.nodes, &graph.edges)
    };

    println!("=== Blueprint Metrics ===");
    print!("{}", metrics);
    if exact {
        println!("(token counts from cl100k_base)");
    }

    Ok(())
}

fn run_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            config_init(force)?;
        }
        ConfigCommands::Show { section } => {
            config_show(section)?;
        }
        ConfigCommands::Path => {
            println!("{}", Config::default_path().display());
        }
        ConfigCommands::Validate => {
            config_validate()?;
        }
    }
    Ok(())
}

fn config_init(force: bool) -> Result<()> {
    let path = Config::default_path();

    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config.save()?;

    println!("Configuration file created at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file to add your Supabase project, or");
    println!("  2. Set environment variables:");
    println!("     export SUPABASE_URL=https://<project>.supabase.co");
    println!("     export SUPABASE_ANON_KEY=your_anon_key");
    println!("     export SUPABASE_SERVICE_ROLE_KEY=your_service_role_key");

    Ok(())
}

fn config_show(section: Option<String>) -> Result<()> {
    let config = Config::load()?;

    let display = if let Some(sec) = section {
        match sec.to_lowercase().as_str() {
            "server" => toml::to_string_pretty(&config.server)?,
            "supabase" => toml::to_string_pretty(&mask_keys(&config).supabase)?,
            "optimization" => toml::to_string_pretty(&config.optimization)?,
            _ => {
                println!("Unknown section: {}", sec);
                println!("Available: server, supabase, optimization");
                return Ok(());
            }
        }
    } else {
        toml::to_string_pretty(&mask_keys(&config))?
    };

    println!("{}", display);
    Ok(())
}

fn mask_keys(config: &Config) -> Config {
    let mut masked = config.clone();
    if masked.supabase.anon_key.is_some() {
        masked.supabase.anon_key = Some("***".to_string());
    }
    if masked.supabase.service_role_key.is_some() {
        masked.supabase.service_role_key = Some("***".to_string());
    }
    masked
}

fn config_validate() -> Result<()> {
    let config = Config::load()?;

    if let Err(e) = config.validate() {
        bail!("Configuration invalid: {}", e);
    }
    println!("Optimizer settings: OK");

    match config.validate_supabase() {
        Ok(()) => println!("Supabase settings: OK"),
        Err(e) => println!("Supabase settings: {} (only `serve --dev-token` will work)", e),
    }

    Ok(())
}
