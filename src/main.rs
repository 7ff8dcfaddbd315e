//! Quorum CLI — answer one query through the ensemble pipeline.
//!
//! ```bash
//! # Defaults (endpoint from QUORUM_ENDPOINT, key from QUORUM_API_KEY)
//! quorum "explain recursion"
//!
//! # Explicit config and the step-based strategy
//! quorum --config quorum.toml --strategy steps "explain recursion"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use quorum::{
    Dispatcher, HttpProviderClient, Orchestrator, PipelineConfig, QualityScorer, QueryCache,
    SelectionStrategy, SelfConsistencySelector, StepCountSelector,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (endpoint, providers, cache and sampling settings)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Selection strategy for picking the winning answer
    #[arg(long, value_enum, default_value_t = Strategy::SelfConsistency)]
    strategy: Strategy,

    /// The query to answer
    query: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Frequency voting plus multi-metric quality scoring
    SelfConsistency,
    /// Step-count scoring over chain-of-thought renderings
    Steps,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quorum=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };

    let client = Arc::new(HttpProviderClient::new(
        &config.endpoint_url,
        config.api_key.clone(),
        config.request_timeout(),
    )?);
    let dispatcher = Dispatcher::new(client, config.providers.clone(), config.generation_params());
    let cache = Arc::new(QueryCache::new(config.cache_capacity, config.cache_ttl()));

    let strategy: Box<dyn SelectionStrategy> = match args.strategy {
        Strategy::SelfConsistency => Box::new(SelfConsistencySelector::new(QualityScorer::new(
            &config.keywords,
        ))),
        Strategy::Steps => Box::new(StepCountSelector),
    };

    let orchestrator = Orchestrator::new(cache, dispatcher, strategy);
    let answer = orchestrator.handle_query("cli", &args.query).await?;
    println!("{answer}");

    Ok(())
}
