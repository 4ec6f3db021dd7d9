//! storesync - follows a MUD store contract and mirrors its tables in memory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use storesync_engine::{Engine, Indexer, IndexerConfig, IngestError, RpcLogSource};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "storesync",
    version,
    about = "Index MUD store tables from an EVM node"
)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// First block to index (overrides the config file)
    #[arg(long)]
    from: Option<u64>,

    /// JSON-RPC endpoint (overrides the config file)
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("storesync: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match setup_logging(config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("storesync: failed to open log file: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        endpoint = %config.endpoint,
        from = config.starting_height,
        "starting indexer"
    );

    let engine = Arc::new(Engine::from_config(&config));
    let source = RpcLogSource::new(config.endpoint.clone(), config.fetch_timeout)
        .with_address(config.world_address);
    let indexer = Indexer::new(engine, source, config);

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = stop.send(true);
        }
    });

    match indexer.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(IngestError::Consistency(violation)) => {
            error!(tx = %violation.tx_hash(), "{violation}");
            ExitCode::from(2)
        }
    }
}

fn load_config(args: &Args) -> Result<IndexerConfig, storesync_engine::EngineError> {
    let mut config = match &args.config {
        Some(path) => IndexerConfig::load(path)?,
        None => IndexerConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(from) = args.from {
        config.starting_height = from;
    }
    config.validate()?;
    Ok(config)
}

/// Logs go to `log_file` when set, otherwise to stderr.
fn setup_logging(
    log_file: Option<&Path>,
) -> std::io::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "log_file has no file name")
    })?;

    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(Some(guard))
}
