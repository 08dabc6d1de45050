use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use gstorage::config::{LoaderConfig, StoragePaths};
use gstorage::models::RunReport;
use gstorage::pipeline::CancelFlag;
use gstorage::store::memory::MemoryGraphStore;
use gstorage::GStorage;
use serde::Deserialize;
use talentfetcher::episodes::DeriveOptions;
use talentfetcher::{CsvCursor, SourceParams, TalentMapper};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the gmigrate command line interface.
pub async fn run_cli() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let report = execute_run(args).await?;
            info!(
                rows = report.stats.rows_processed,
                skipped = report.stats.rows_skipped,
                batches_failed = report.stats.batches_failed,
                cancelled = report.cancelled,
                "load finished"
            );
        }
        Command::Status(args) => show_status(args)?,
        Command::Reset(args) => reset(args)?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Loads a talent CSV into the graph store, resuming from the last
    /// checkpoint when one exists
    Run(RunArgs),
    /// Prints the checkpoint and the latest run's catalog entry
    Status(TargetArgs),
    /// Clears the checkpoint so the next run starts from offset 0
    Reset(TargetArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Durable SQLite-backed graph store
    Sqlite,
    /// In-memory store; useful for dry runs
    Memory,
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the talent CSV export
    pub source: PathBuf,
    /// Base directory for checkpoint, catalog and graph data
    #[arg(long, env = "GMIGRATE_BASE_PATH")]
    pub base_path: PathBuf,
    /// Optional JSON config file with loader and source sections
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = BackendKind::Sqlite)]
    pub backend: BackendKind,
    /// Override the configured worker count
    #[arg(long)]
    pub workers: Option<usize>,
    /// Abort on the first permanently failed batch
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,
    /// Ignore any existing checkpoint and start from offset 0
    #[arg(long, default_value_t = false)]
    pub fresh: bool,
}

#[derive(Args)]
pub struct TargetArgs {
    #[arg(long, env = "GMIGRATE_BASE_PATH")]
    pub base_path: PathBuf,
}

/// Loader and source sections of the JSON config file; both optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    loader: LoaderConfig,
    source: SourceParams,
}

fn load_file_config(path: Option<&PathBuf>) -> anyhow::Result<FileConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))
        }
        None => Ok(FileConfig::default()),
    }
}

/// Assembles and runs one load. Shared by the CLI and the end-to-end
/// tests.
pub async fn execute_run(args: RunArgs) -> anyhow::Result<RunReport> {
    let FileConfig {
        loader: mut config,
        source: source_params,
    } = load_file_config(args.config.as_ref())?;
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if args.fail_fast {
        config.fail_fast = true;
    }

    let paths = StoragePaths::new(&args.base_path);
    let storage = match args.backend {
        BackendKind::Sqlite => GStorage::open_sqlite(paths)?,
        BackendKind::Memory => {
            GStorage::open_with_store(paths, Arc::new(MemoryGraphStore::new()))?
        }
    };

    if args.fresh {
        storage.checkpoint_manager().clear()?;
    }

    let cursor = CsvCursor::open(&args.source, config.chunk_size, &source_params)
        .with_context(|| format!("opening source {}", args.source.display()))?;
    let mapper = TalentMapper::new(
        source_params.columns.clone(),
        DeriveOptions {
            idle_gap_days: config.idle_gap_days,
            infer_initial: config.infer_initial,
            default_start: config.default_start,
        },
    );

    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; draining in-flight batches");
            signal_flag.cancel();
        }
    });

    let source_label = args
        .source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.source.display().to_string());
    let mut pipeline = storage.pipeline(config, Box::new(cursor), Arc::new(mapper));
    let report = pipeline.run(&source_label, cancel).await?;
    Ok(report)
}

fn show_status(args: TargetArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&args.base_path);

    match gstorage::checkpoint::CheckpointManager::new(&paths.checkpoint_path).load()? {
        Some(checkpoint) => println!(
            "checkpoint: offset {} ({} rows processed, {} skipped, saved {})",
            checkpoint.offset,
            checkpoint.rows_processed,
            checkpoint.rows_skipped,
            checkpoint.saved_at
        ),
        None => println!("checkpoint: none (next run starts from offset 0)"),
    }

    if paths.catalog_path.exists() {
        let catalog = gstorage::catalog::Catalog::new(&paths.catalog_path)?;
        catalog.initialize_schema()?;
        match catalog.latest_run_log()? {
            Some(run) => {
                println!(
                    "last run #{} over '{}': {} (started {}, ended {:?})",
                    run.run_id, run.source, run.status, run.start_time, run.end_time
                );
                let failed = catalog.list_failed_batches(run.run_id)?;
                if !failed.is_empty() {
                    println!("failed batches awaiting replay: {}", failed.len());
                }
            }
            None => println!("no runs recorded"),
        }
    } else {
        println!("no catalog at {}", paths.catalog_path.display());
    }
    Ok(())
}

fn reset(args: TargetArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&args.base_path);
    gstorage::checkpoint::CheckpointManager::new(&paths.checkpoint_path).clear()?;
    println!("checkpoint cleared; next run starts from offset 0");
    Ok(())
}
