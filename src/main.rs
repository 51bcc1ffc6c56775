//! strap CLI
//!
//! Entry point for the command-line tool.
//!
//! Exit codes:
//! - 0: Success (including runs with nothing to do)
//! - 1: Migration error (bad migration file, duplicate sequence, database
//!   failure, interrupted run, etc.)
//! - 2: Tool error (config error, bad arguments, I/O error writing files, etc.)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use thiserror::Error;
use tracing::{info, warn};

use strap::output::OutputFormat;
use strap::planner::{self, Direction};
use strap::{
    Config, MigrateError, Migrator, MigrationFile, PgBackend, RollbackCount, RunSummary,
    StatusReport, scaffold, sql,
};

/// Default config file name used when --config is not explicitly provided.
const DEFAULT_CONFIG_FILE: &str = "strap.toml";

#[derive(Parser, Debug)]
#[command(name = "strap", version)]
#[command(about = "Schema migrations for PostgreSQL", long_about = None)]
struct Args {
    /// Path to configuration file [default: strap.toml]
    #[arg(short, long, env = "STRAP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log verbosity (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a strap.toml template
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Create a new, empty migration file
    #[command(alias = "migration:create")]
    Create {
        /// Name of the migration (letters, digits, '_' and '-')
        #[arg(short, long)]
        name: String,
    },

    /// Apply every pending migration
    Up {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Revert the most recently applied migrations
    Down {
        /// Number of migrations to revert [default: 1]
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,

        /// Revert every applied migration
        #[arg(long, conflicts_with = "count")]
        all: bool,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show applied and pending migrations
    Status {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Parse every migration file without connecting to the database
    Check {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Ctrl-C arrived while a run was in progress.
#[derive(Debug, Error)]
#[error("Interrupted; migrations committed before the interrupt remain applied")]
struct Interrupted;

/// A database-backed operation.
#[derive(Debug, Clone, Copy)]
enum Operation {
    Forward,
    Backward(RollbackCount),
    Status,
}

enum Outcome {
    Run(RunSummary),
    Status(StatusReport),
}

fn main() {
    let args = Args::parse();
    setup_logging(args.log_level, args.log_format);

    if let Err(err) = run(args) {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}

/// Migration failures exit 1, everything else 2.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err
        .chain()
        .any(|e| e.is::<MigrateError>() || e.is::<Interrupted>())
    {
        1
    } else {
        2
    }
}

fn setup_logging(level: LogLevel, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("{level},sqlx=warn")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Init { force } => {
            let path = args
                .config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            scaffold::init(&path, force).context("Failed to initialize project")?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Create { name } => {
            let config = load_config(&args.config)?;
            let millis = chrono::Utc::now().timestamp_millis();
            let path = scaffold::create_migration(&config.migration.directory, &name, millis)
                .context("Failed to create migration file")?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Check { format } => {
            let config = load_config(&args.config)?;
            let files = load_files(&config)?;
            planner::verify_ordering(&files)?;
            let checks = sql::check_files(&files)?;
            info!(files = checks.len(), "All migration files parsed");
            format
                .reporter()
                .check(&checks, &mut std::io::stdout().lock())
                .context("Failed to write check report")?;
            Ok(())
        }
        Command::Up { format } => {
            let config = load_config(&args.config)?;
            run_database(&config, Operation::Forward, format)
        }
        Command::Down { count, all, format } => {
            let config = load_config(&args.config)?;
            let count = match (all, count) {
                (true, _) => RollbackCount::All,
                (false, Some(n)) => RollbackCount::Steps(usize::try_from(n).unwrap_or(usize::MAX)),
                (false, None) => RollbackCount::default(),
            };
            run_database(&config, Operation::Backward(count), format)
        }
        Command::Status { format } => {
            let config = load_config(&args.config)?;
            run_database(&config, Operation::Status, format)
        }
    }
}

/// Load the repository, run every file-only check, then connect and run
/// `operation` on a single-threaded runtime.
fn run_database(config: &Config, operation: Operation, format: OutputFormat) -> Result<()> {
    let files = load_files(config)?;
    match operation {
        Operation::Forward => planner::preflight(&files, Direction::Forward)?,
        Operation::Backward(_) => planner::preflight(&files, Direction::Backward)?,
        Operation::Status => planner::verify_ordering(&files)?,
    }

    let options = config
        .database
        .connect_options()
        .context("Invalid database configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let backend = PgBackend::connect(&options, config.migration.ledger()).await?;
        let mut migrator = Migrator::new(files, backend);

        let outcome = tokio::select! {
            result = operate(&mut migrator, operation) => result?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Err(Interrupted.into());
            }
        };

        let reporter = format.reporter();
        let mut stdout = std::io::stdout().lock();
        let written = match &outcome {
            Outcome::Run(summary) => reporter.summary(summary, &mut stdout),
            Outcome::Status(report) => reporter.status(report, &mut stdout),
        };
        written.context("Failed to write report")?;
        stdout.flush().context("Failed to write report")?;
        drop(stdout);

        if let Err(e) = migrator.into_backend().close().await {
            warn!("Failed to close database connection cleanly: {}", e);
        }
        Ok::<(), anyhow::Error>(())
    })
}

async fn operate(
    migrator: &mut Migrator<PgBackend>,
    operation: Operation,
) -> strap::Result<Outcome> {
    match operation {
        Operation::Forward => migrator.run_forward().await.map(Outcome::Run),
        Operation::Backward(count) => migrator.run_backward(count).await.map(Outcome::Run),
        Operation::Status => migrator.status().await.map(Outcome::Status),
    }
}

fn load_files(config: &Config) -> Result<Vec<MigrationFile>> {
    let repository = config.migration.repository();
    repository.load().with_context(|| {
        format!(
            "Failed to load migrations from {}",
            repository.dir().display()
        )
    })
}

/// Load configuration from file.
///
/// If `config_path` is `Some`, the user explicitly passed `--config` (or set
/// `STRAP_CONFIG`) and the file must exist. If `None`, the default config
/// path is used; a missing default config file falls back to defaults with a
/// warning.
fn load_config(config_path: &Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::from_file(path).context("Failed to load configuration")
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Config::from_file(default_path).context("Failed to load configuration")
            } else {
                warn!(
                    "Config file {} not found, using defaults",
                    default_path.display()
                );
                Ok(Config::default())
            }
        }
    }
}
