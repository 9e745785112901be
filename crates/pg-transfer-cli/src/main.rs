//! pg-transfer CLI - one-shot PostgreSQL to PostgreSQL migration.

use clap::{Parser, Subcommand};
use pg_transfer::orchestrator::registry_plan;
use pg_transfer::{health_check, Config, MigrateError, Orchestrator, RunOptions, RunReport, TableRegistry};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-transfer")]
#[command(about = "Copy an application's tables between two PostgreSQL databases, then reconcile row counts")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (URLs may come from the environment instead)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"], global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"], global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every registered table, then validate row counts
    Run {
        /// Show the plan with source row counts without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Do not re-count tables after migrating
        #[arg(long)]
        skip_validation: bool,

        /// Override number of concurrent row inserts per table
        #[arg(long)]
        row_workers: Option<usize>,

        /// Override rows fetched per source page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Compare row counts between source and destination
    Validate,

    /// Test database connections
    HealthCheck,

    /// Print the table registry in migration order
    Plan,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format)?;

    match cli.command {
        // Plan needs no connection strings
        Commands::Plan => {
            let registry = match cli.config {
                Some(ref path) => Config::read(path)?.registry()?,
                None => TableRegistry::builtin()?,
            };
            let plan = registry_plan(&registry);
            if cli.output_json {
                println!("{}", plan.to_json()?);
            } else {
                print!("{}", plan);
            }
            Ok(0)
        }

        Commands::Run {
            dry_run,
            skip_validation,
            row_workers,
            page_size,
        } => {
            let mut config = load_config(cli.config.as_deref())?;

            // Apply overrides
            if let Some(w) = row_workers {
                config.migration.row_workers = w;
            }
            if let Some(p) = page_size {
                config.migration.page_size = p;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config).await?;

            if dry_run {
                let plan = orchestrator.plan().await;
                orchestrator.close().await;
                let plan = plan?;
                if cli.output_json {
                    println!("{}", plan.to_json()?);
                } else {
                    print!("{}", plan);
                    println!("dry run: nothing was written");
                }
                return Ok(0);
            }

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler();

            let report = orchestrator
                .run(RunOptions { skip_validation }, cancel_token)
                .await;
            orchestrator.close().await;

            emit_report(&report, cli.output_json)?;
            Ok(report.exit_code())
        }

        Commands::Validate => {
            let config = load_config(cli.config.as_deref())?;
            let orchestrator = Orchestrator::new(config).await?;
            let cancel_token = setup_signal_handler();

            let report = orchestrator.validate(cancel_token).await;
            orchestrator.close().await;

            emit_report(&report, cli.output_json)?;
            Ok(report.exit_code())
        }

        Commands::HealthCheck => {
            let config = load_config(cli.config.as_deref())?;
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print!("{}", result);
            }
            Ok(result.exit_code())
        }
    }
}

/// Configuration from `--config` (with environment overrides) or from the environment alone.
///
/// The registry ordering is checked here, before any connection is opened.
fn load_config(path: Option<&Path>) -> Result<Config, MigrateError> {
    let config = match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::from_env()?,
    };

    let registry = config.registry()?;
    info!("Registry: {} tables", registry.len());
    Ok(config)
}

fn emit_report(report: &RunReport, as_json: bool) -> Result<(), MigrateError> {
    if as_json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// Logs go to stderr so the report on stdout stays machine-readable.
///
/// `RUST_LOG`, when set, takes precedence over `--verbosity`.
fn setup_logging(verbosity: &str, format: &str) -> Result<(), MigrateError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| MigrateError::Config(format!("failed to initialize logging: {}", e)))
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Finishing the current row, then reporting...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current row, then reporting...");
            token.cancel();
        }
    });

    cancel_token
}
