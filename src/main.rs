use anyhow::Context;
use clap::Parser;
use search_index_manager::{
    cli::{Cli, Command},
    config::{Config, ObservabilityConfig},
    create_backend,
    desired::create_provider,
    metrics::write_textfile,
    AppError, ConvergenceEngine, IndexNames,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.observability, cli.json_logs);

    tracing::info!("Starting search index manager v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Backend: {:?} at {}", config.backend.kind, config.backend.url);

    let code = match run(&cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error_code = e.error_code(), "{}", e);
            e.exit_code()
        }
    };

    let textfile: Option<PathBuf> = cli
        .metrics_textfile
        .clone()
        .or_else(|| config.observability.metrics_textfile.clone());
    if let Some(path) = textfile {
        if let Err(e) = write_textfile(&path) {
            tracing::warn!(path = %path.display(), "Failed to write metrics: {}", e);
        }
    }

    std::process::exit(code);
}

fn init_tracing(observability: &ObservabilityConfig, json_cli: bool) {
    let default_filter = format!("search_index_manager={}", observability.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json_cli || observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<i32, AppError> {
    let index_type = cli.index_type()?;
    let spec = config.index_type(index_type)?.clone();
    let backend = create_backend(&config.backend)?;
    let desired = create_provider(&config.desired)?;
    let names = IndexNames::new(&config.index.base_name, index_type)
        .with_other_types(config.index_types.keys());
    let identifier = cli.identifier();

    match cli.command() {
        Command::Converge(args) => {
            let spec = args.reindex.apply(&spec)?;
            let engine = ConvergenceEngine::new(backend, desired, names, spec, config.reindex.clone());
            let report = engine.converge(&args.options(identifier)).await?;
            tracing::info!(
                index = %report.index,
                corrections = report.corrections.len(),
                issues = report.issues.len(),
                "Run finished"
            );
            Ok(report.exit_code())
        }
        Command::ForceOpen => {
            let engine = ConvergenceEngine::new(backend, desired, names, spec, config.reindex.clone());
            let index = engine.force_open(&identifier).await?;
            tracing::info!(index = %index, "Index is open");
            Ok(0)
        }
        Command::ForceReindex(args) => {
            let spec = args.apply(&spec)?;
            let engine = ConvergenceEngine::new(backend, desired, names, spec, config.reindex.clone());
            let outcome = engine.force_reindex(&identifier).await?;
            tracing::info!(
                documents = outcome.documents_written,
                source_count = outcome.source_count,
                destination_count = outcome.destination_count,
                "Reindex finished"
            );
            Ok(0)
        }
    }
}
