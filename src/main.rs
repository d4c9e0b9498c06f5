use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use common::index::{InMemoryMetricIndex, MetricIndex};
use common::stats::StatsRegistry;
use common::storage::InMemoryMetricStore;
use common::throttling::TokenBucketThrottler;
use querier::{EvaluationPool, Evaluator, FunctionRegistry, Governor, RenderService};
use router::{ReaderState, create_router};
use tokio::signal;

/// Tenant that seeded samples are stored under
const SEED_TENANT: &str = "NONE";

#[derive(Parser, Debug)]
#[command(name = "graphene", about = "Graphite-compatible metrics reader")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

fn build_state(config: &Configuration, stats: Arc<StatsRegistry>) -> anyhow::Result<ReaderState> {
    let step = config.storage.native_step.as_secs() as i64;
    let store = Arc::new(InMemoryMetricStore::new(step));
    if let Some(seed) = &config.storage.seed_file {
        store
            .load_plaintext_file(SEED_TENANT, seed)
            .with_context(|| format!("Failed to load seed file {}", seed.display()))?;
    }
    let index: Arc<dyn MetricIndex> = Arc::new(InMemoryMetricIndex::backed_by(store.clone()));

    let registry = Arc::new(FunctionRegistry::builtin());
    log::info!("Registered {} query functions", registry.names().len());

    let evaluator = Evaluator::new(store, index.clone(), registry);
    let governor = Governor::new(
        evaluator,
        EvaluationPool::new(config.reader.max_concurrent_evaluations),
        Arc::new(TokenBucketThrottler::new(config.throttling.clone())),
        stats.clone(),
        config.reader.request_timeout,
    );
    let render_service = RenderService::new(governor, config.reader.human_readable_numbers)
        .with_window_limit(step, config.reader.max_data_points);

    Ok(ReaderState::new(config.clone(), render_service, index, stats))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;
    match cli.command.unwrap_or_default() {
        CommonCommands::Config { json } => return utils::show_config(&config, json),
        CommonCommands::Validate => return utils::validate_config(&config),
        CommonCommands::Start => utils::validate_config(&config)?,
    }

    let stats = Arc::new(StatsRegistry::new());
    let reporter = config
        .stats
        .enabled
        .then(|| stats.spawn_reporter(config.stats.interval));

    let state = build_state(&config, stats.clone())?;
    let app = create_router(state);

    let addr: SocketAddr = config
        .reader
        .bind
        .parse()
        .with_context(|| format!("Invalid reader.bind address '{}'", config.reader.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Starting graphene reader on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
        })
        .await
        .context("HTTP server failed")?;

    log::info!("Shutting down graphene reader");
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    stats.report();

    Ok(())
}
