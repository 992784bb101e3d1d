//! PatternLab CLI — feature pipeline, persistence and legacy migration.
//!
//! Commands:
//! - `process` — run the pipeline and save each timeframe through the repository
//! - `show` — print the latest stored rows for a timeframe
//! - `migrate` — backfill the database from the legacy file layout
//! - `mode` — show or change the storage mode

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use patternlab_core::data::RawDataLoader;
use patternlab_core::pipeline::timestamp::format_timestamp;
use patternlab_core::pipeline::{Pipeline, PipelineRun, ScalerPolicy, ScalerState};
use patternlab_core::{BarFrame, Timeframe};
use patternlab_store::{
    FileStore, MigrationCoordinator, PersistenceRepository, SqliteDb, SqliteStore,
    StorageModePolicy, StorageModeSetting,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "patternlab",
    about = "PatternLab CLI — OHLCV feature pipeline with tiered persistence"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to ./patternlab.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run load → clean → engineer → normalize and persist the result.
    Process {
        /// Timeframe to process (e.g., 1h). Defaults to every raw file found.
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Print the most recent stored rows for a timeframe.
    Show {
        #[arg(long)]
        timeframe: String,

        /// Number of rows; 0 shows everything.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Backfill the database from the legacy file layout.
    Migrate {
        /// Timeframes to migrate (e.g., 1h 4h 1d). Defaults to all found.
        #[arg(long, num_args = 1..)]
        timeframes: Vec<String>,

        #[arg(long, value_enum, default_value_t = MigrationKind::All)]
        kind: MigrationKind,
    },
    /// Show the storage mode, or change it when --primary/--fallback are given.
    Mode {
        /// database | file
        #[arg(long)]
        primary: Option<String>,

        /// database | file | none
        #[arg(long)]
        fallback: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MigrationKind {
    All,
    Processed,
    Patterns,
    Analysis,
    Visualizations,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process { timeframe } => run_process(&config, timeframe.as_deref()),
        Commands::Show { timeframe, limit } => run_show(&config, &timeframe, limit),
        Commands::Migrate { timeframes, kind } => run_migrate(&config, &timeframes, kind),
        Commands::Mode { primary, fallback } => run_mode(&config, primary, fallback),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn open_db(config: &AppConfig) -> Result<Arc<SqliteDb>> {
    let path = &config.storage.database;
    let db = SqliteDb::open(path, config.storage.busy_timeout())
        .with_context(|| format!("open database {}", path.display()))?;
    Ok(Arc::new(db))
}

/// Database handle plus a repository over it and the configured file tree.
fn open_repository(config: &AppConfig) -> Result<(PersistenceRepository, PathBuf)> {
    let db = open_db(config)?;
    let coordinator = MigrationCoordinator::new(
        Arc::clone(&db),
        &config.storage.base_dir,
        &config.data.symbol,
    );
    if !coordinator.initialize_schema() {
        bail!("database initialization failed");
    }

    let policy = StorageModePolicy::new(db.clone());
    let processed_dir = policy
        .get_file_paths()
        .resolved(&config.storage.base_dir)
        .processed_data;
    let repo = PersistenceRepository::new(
        config.data.symbol.clone(),
        policy,
        Arc::new(SqliteStore::new(db)),
        Arc::new(FileStore::new(&processed_dir)),
    );
    Ok((repo, processed_dir))
}

fn scaler_path(dir: &Path, symbol: &str, timeframe: &Timeframe) -> PathBuf {
    dir.join(format!("{symbol}_{timeframe}_scaler.json"))
}

fn run_process(config: &AppConfig, timeframe: Option<&str>) -> Result<()> {
    let timeframe = timeframe.map(str::parse::<Timeframe>).transpose()?;
    let (repo, processed_dir) = open_repository(config)?;

    let loader = RawDataLoader::new(&config.data.dir, &config.data.symbol);
    let mut pipeline = Pipeline::new(config.pipeline.clone(), loader);

    if config.pipeline.scaler == ScalerPolicy::ReuseStored {
        let candidates = match &timeframe {
            Some(tf) => vec![tf.clone()],
            None => pipeline.loader().available_timeframes()?,
        };
        for tf in candidates {
            let path = scaler_path(&processed_dir, &config.data.symbol, &tf);
            if !path.exists() {
                continue;
            }
            match ScalerState::load(&path) {
                Ok(state) => pipeline.scalers_mut().insert(state),
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable scaler state"),
            }
        }
    }

    let results = pipeline.run(timeframe.as_ref())?;
    if results.is_empty() {
        bail!("no raw data found in {}", config.data.dir.display());
    }

    let mut failed = Vec::new();
    for (tf, outcome) in results {
        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                error!(timeframe = %tf, error = %e, "pipeline failed");
                failed.push(tf);
                continue;
            }
        };
        match persist_run(config, &repo, &processed_dir, &run) {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                error!(timeframe = %tf, error = %e, "persisting run failed");
                failed.push(tf);
            }
        }
    }

    if !failed.is_empty() {
        let labels: Vec<String> = failed.iter().map(|tf| tf.to_string()).collect();
        bail!("failed timeframes: {}", labels.join(", "));
    }
    info!("processing complete");
    Ok(())
}

/// Save one timeframe's run, its scaler state, and count its windows.
fn persist_run(
    config: &AppConfig,
    repo: &PersistenceRepository,
    processed_dir: &Path,
    run: &PipelineRun,
) -> Result<String> {
    let tf = &run.timeframe;
    let saved = repo.save_with_outcome(tf, &run.frame);
    if !saved.succeeded {
        bail!(
            "save failed: {}",
            saved.error.as_deref().unwrap_or("unknown error")
        );
    }

    let path = scaler_path(processed_dir, &config.data.symbol, tf);
    std::fs::create_dir_all(processed_dir)?;
    run.scaler
        .save(&path)
        .with_context(|| format!("write scaler state {}", path.display()))?;

    let windows = run.windows(&config.pipeline.pattern_columns, config.pipeline.window_size)?;
    let backend = saved.backend.map(|b| b.as_str()).unwrap_or("-");
    Ok(format!(
        "{tf}: {} rows ({} warm-up dropped, {} gaps) → {backend}{}; {} windows of {}",
        run.frame.len(),
        run.warmup_rows_dropped,
        run.report.gaps.len(),
        if saved.degraded { " (degraded)" } else { "" },
        windows.len(),
        config.pipeline.window_size,
    ))
}

fn run_show(config: &AppConfig, timeframe: &str, limit: usize) -> Result<()> {
    let tf: Timeframe = timeframe.parse()?;
    let (repo, _) = open_repository(config)?;

    let read = repo.get_with_outcome(&tf, limit);
    if let Some(err) = &read.error {
        eprintln!("warning: {err}");
    }
    match read.frame {
        Some(frame) => {
            print_frame(&frame);
            if read.degraded {
                println!("(read from fallback backend)");
            }
            Ok(())
        }
        None if read.error.is_some() => bail!("no data readable for {tf}"),
        None => {
            println!("No data stored for {} {tf}", config.data.symbol);
            Ok(())
        }
    }
}

/// Timestamp plus OHLC and a few indicators when present.
fn print_frame(frame: &BarFrame) {
    const SHOWN: [&str; 8] = [
        "open", "high", "low", "close", "rsi_14", "macd", "atr_14", "direction",
    ];
    let cols: Vec<&str> = SHOWN
        .iter()
        .copied()
        .filter(|c| frame.has_column(c))
        .collect();

    print!("{:<20}", "timestamp");
    for c in &cols {
        print!(" {c:>12}");
    }
    println!();
    for (row, ts) in frame.timestamps().iter().enumerate() {
        print!("{:<20}", format_timestamp(ts));
        for c in &cols {
            match frame.value(row, c) {
                Some(v) if v.is_finite() => print!(" {v:>12.5}"),
                _ => print!(" {:>12}", "-"),
            }
        }
        println!();
    }
    println!("{} rows, {} columns", frame.len(), frame.columns().len());
}

fn run_migrate(config: &AppConfig, timeframes: &[String], kind: MigrationKind) -> Result<()> {
    let db = open_db(config)?;
    let coordinator = MigrationCoordinator::new(db, &config.storage.base_dir, &config.data.symbol);
    let selected = (!timeframes.is_empty()).then_some(timeframes);

    if kind != MigrationKind::All && !coordinator.initialize_schema() {
        bail!("database initialization failed");
    }

    let report = match kind {
        MigrationKind::All => {
            let summary = coordinator.migrate_all(selected);
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{json}");
            if !summary.success {
                bail!("migration finished with failures");
            }
            return Ok(());
        }
        MigrationKind::Processed => coordinator.migrate_processed(selected),
        MigrationKind::Patterns => coordinator.migrate_patterns(selected),
        MigrationKind::Analysis => coordinator.migrate_analysis(selected),
        MigrationKind::Visualizations => {
            let counts = coordinator.migrate_visualizations();
            println!("{}", serde_json::to_string_pretty(&counts)?);
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.values().any(|ok| !ok) {
        bail!("migration finished with failures");
    }
    Ok(())
}

fn run_mode(config: &AppConfig, primary: Option<String>, fallback: Option<String>) -> Result<()> {
    let (repo, _) = open_repository(config)?;
    let policy = repo.policy();
    let current = policy.get_mode();

    if primary.is_some() || fallback.is_some() {
        let next = StorageModeSetting::new(
            primary.unwrap_or(current.primary),
            fallback.unwrap_or(current.fallback),
        );
        policy.set_mode(&next)?;
        println!("storage mode: primary={} fallback={}", next.primary, next.fallback);
    } else {
        println!(
            "storage mode: primary={} fallback={}",
            current.primary, current.fallback
        );
        let paths = policy.get_file_paths();
        println!("  processed_data: {}", paths.processed_data.display());
        println!("  patterns:       {}", paths.patterns.display());
        println!("  analysis:       {}", paths.analysis.display());
    }
    Ok(())
}
