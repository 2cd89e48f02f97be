//! Taxograph CLI: taxonomy-graph indexing service.
//!
//! Usage:
//!   taxograph run --events <file.jsonl> --classifications <file.json> [--db path] [--config path]
//!   taxograph recover --classifications <file.json> [--db path] [--config path]
//!   taxograph import <records.jsonl> [--db path]
//!   taxograph status [--db path]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxograph::pipeline::{IndexingHandler, ReadinessProbe, RecordEventHandler, RecoveryScanner};
use taxograph::source::{load_records, ClassificationFileExtractor, JsonlEventSource, StoreProbe};
use taxograph::{CancellationToken, Config, GraphStore, IndexingService, OpenStore, SqliteStore};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "taxograph", version, about = "Recoverable taxonomy-graph indexing")]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover in-progress records, then consume events until done or Ctrl-C
    Run {
        /// Newline-delimited JSON change events
        #[arg(long)]
        events: PathBuf,
        /// JSON map of record id to classification
        #[arg(long)]
        classifications: PathBuf,
        /// Skip the startup recovery scan
        #[arg(long)]
        no_recovery: bool,
        /// Override consumer.max_concurrency
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Override consumer.admission_rate_per_sec (0 disables throttling)
        #[arg(long)]
        rate: Option<u32>,
    },
    /// Run the recovery scan only
    Recover {
        /// JSON map of record id to classification
        #[arg(long)]
        classifications: PathBuf,
    },
    /// Load record documents into the store
    Import {
        /// Newline-delimited JSON records
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Show record counts per indexing status
    Status,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<Config, String> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| taxograph::config::data_dir().join("config.yaml"));
    let mut config = Config::load(&path).map_err(|e| e.to_string())?;
    if db.is_some() {
        config.store.path = db;
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<dyn GraphStore>, String> {
    let db_path = config.store.resolved_path();
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

async fn cmd_run(
    mut config: Config,
    store: Arc<dyn GraphStore>,
    events: &Path,
    classifications: &Path,
    no_recovery: bool,
    max_concurrency: Option<usize>,
    rate: Option<u32>,
) -> i32 {
    if no_recovery {
        config.recovery.enabled = false;
    }
    if let Some(limit) = max_concurrency {
        config.consumer.max_concurrency = limit;
    }
    if let Some(rate) = rate {
        config.consumer.admission_rate_per_sec = rate;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return 1;
    }

    let extractor = match ClassificationFileExtractor::load(classifications) {
        Ok(extractor) => Arc::new(extractor),
        Err(e) => {
            eprintln!("Error: cannot load classifications: {}", e);
            return 1;
        }
    };
    let mut source = match JsonlEventSource::open(events).await {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot open events: {}", e);
            return 1;
        }
    };

    let probe: Arc<dyn ReadinessProbe> = Arc::new(StoreProbe(store.clone()));
    let service = IndexingService::from_config(&config, store, extractor, Some(probe));

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                token.cancel();
            }
        });
    }

    match service.run(&mut source, &token).await {
        Ok(report) => {
            if let Some(recovery) = report.recovery {
                println!(
                    "Recovery: {} scanned, {} recovered, {} failed",
                    recovery.scanned, recovery.recovered, recovery.failed
                );
            }
            let stats = report.consumer;
            println!(
                "Events: {} processed, {} succeeded, {} failed, {} timed out, {} skipped",
                stats.processed, stats.succeeded, stats.failed, stats.timed_out, stats.skipped
            );
            0
        }
        Err(e) => {
            error!(error = %e, "service stopped");
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_recover(config: &Config, store: Arc<dyn GraphStore>, classifications: &Path) -> i32 {
    let extractor = match ClassificationFileExtractor::load(classifications) {
        Ok(extractor) => Arc::new(extractor),
        Err(e) => {
            eprintln!("Error: cannot load classifications: {}", e);
            return 1;
        }
    };
    let handler: Arc<dyn RecordEventHandler> = Arc::new(IndexingHandler::new(store.clone(), extractor));
    let probe: Arc<dyn ReadinessProbe> = Arc::new(StoreProbe(store.clone()));
    let scanner = RecoveryScanner::from_config(config, store, handler, Some(probe));
    match scanner.run().await {
        Ok(report) => {
            println!(
                "Recovery: {} scanned, {} recovered, {} failed",
                report.scanned, report.recovered, report.failed
            );
            if report.failed > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_import(store: Arc<dyn GraphStore>, path: &Path) -> i32 {
    let records = match load_records(path) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    for record in &records {
        if let Err(e) = store.save_record(record).await {
            eprintln!("Error: failed to save {}: {}", record.id, e);
            return 1;
        }
    }
    println!("Imported {} records", records.len());
    0
}

async fn cmd_status(store: Arc<dyn GraphStore>) -> i32 {
    let counts = match store.status_counts().await {
        Ok(counts) => counts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if counts.is_empty() {
        println!("No records.");
        return 0;
    }
    println!("{:<12}  {:>8}", "STATUS", "RECORDS");
    println!("{}", "-".repeat(22));
    for (status, count) in counts {
        println!("{:<12}  {:>8}", status.as_str(), count);
    }
    0
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.db) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let store = match open_store(&config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Run {
            events,
            classifications,
            no_recovery,
            max_concurrency,
            rate,
        } => cmd_run(config, store, &events, &classifications, no_recovery, max_concurrency, rate).await,
        Commands::Recover { classifications } => cmd_recover(&config, store, &classifications).await,
        Commands::Import { path } => cmd_import(store, &path).await,
        Commands::Status => cmd_status(store).await,
    };
    std::process::exit(code);
}
