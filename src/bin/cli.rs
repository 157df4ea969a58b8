//! backfill CLI
//!
//! Operator entry point for the historical backfill discovery pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use backfill::{
    config::{load_config, writes_enabled_from_env},
    error::Result,
    models::{Config, RunParams, RunReport},
    pipeline::Orchestrator,
    queue::SpoolQueue,
    services::SourceRegistry,
    storage::{DiscoveryStore, SqliteStore},
    utils::http,
};

/// backfill - Historical Backfill Discovery Pipeline
#[derive(Parser, Debug)]
#[command(
    name = "backfill",
    version,
    about = "Controlled, resumable discovery of historical content items"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "backfill.toml")]
    config: PathBuf,

    /// Override the database path from the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run discovery against one source
    Discover(DiscoverArgs),

    /// List configured sources; does not create a run
    Sources,

    /// Show recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Request cooperative cancellation of a running run
    Cancel {
        /// Run identifier, as shown by `runs`
        run_id: i64,
    },

    /// Validate the configuration file
    Validate,
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Source slug to enumerate
    #[arg(long)]
    source: String,

    /// Cap on newly discovered items for this run
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(1..))]
    max_urls: u32,

    /// Inclusive lower bound on candidate last-modified date (YYYY-MM-DD)
    #[arg(long)]
    date_from: Option<NaiveDate>,

    /// Inclusive upper bound on candidate last-modified date (YYYY-MM-DD)
    #[arg(long)]
    date_to: Option<NaiveDate>,

    /// Perform every check against the real store but write nothing
    #[arg(long)]
    dry_run: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Discover(args) => {
            let config = load_config(&cli.config);
            config.validate()?;

            let db_path = resolve_db_path(&cli.db, &config);
            let store = SqliteStore::open(&db_path)?;
            let client = http::create_async_client(&config.http)?;
            let registry = SourceRegistry::from_config(&config, &client)?;
            let queue = SpoolQueue::new(&config.store.spool_dir);

            // Read once; immutable for the life of the run.
            let writes_enabled = writes_enabled_from_env();

            let orchestrator =
                Orchestrator::new(&store, &registry, &queue, config.retry, writes_enabled);
            let params = RunParams {
                max_items: Some(args.max_urls),
                date_from: args.date_from,
                date_to: args.date_to,
                dry_run: args.dry_run,
            };

            let report = orchestrator.execute(&args.source, params).await?;
            print_report(&report);
            Ok(ExitCode::from(report.exit_code() as u8))
        }

        Command::Sources => {
            let config = load_config(&cli.config);
            config.validate()?;

            let db_path = resolve_db_path(&cli.db, &config);
            // Don't create the database just to list sources.
            let store = db_path.exists().then(|| SqliteStore::open(&db_path)).transpose()?;

            for source in &config.sources {
                let strategy = if source.html.is_some() { "html" } else { "api" };
                let known = match &store {
                    Some(store) => store
                        .item_count(&source.slug)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|_| "?".to_string()),
                    None => "0".to_string(),
                };
                println!(
                    "{:<16} {:<10} delay {}-{}ms  known items: {}  {}",
                    source.slug,
                    strategy,
                    source.rate_limit.min_delay_ms,
                    source.rate_limit.max_delay_ms,
                    known,
                    source.name
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Runs { limit } => {
            let config = load_config(&cli.config);
            let store = SqliteStore::open(resolve_db_path(&cli.db, &config))?;

            let runs = store.recent_runs(limit)?;
            if runs.is_empty() {
                println!("No runs yet.");
                return Ok(ExitCode::SUCCESS);
            }
            for run in runs {
                let c = &run.counters;
                println!(
                    "#{:<5} {:<16} {:<10} discovered {:<6} queued {:<6} skipped {:<6} errored {:<6} {}",
                    run.id.unwrap_or_default(),
                    run.source_slug,
                    run.status.as_str(),
                    c.discovered,
                    c.queued,
                    c.skipped,
                    c.errored,
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Cancel { run_id } => {
            let config = load_config(&cli.config);
            let store = SqliteStore::open(resolve_db_path(&cli.db, &config))?;

            if store.request_cancel(run_id)? {
                println!(
                    "Cancellation requested for run #{run_id}; \
                     the orchestrator will stop at its next checkpoint."
                );
                Ok(ExitCode::SUCCESS)
            } else {
                log::error!("run #{run_id} is not pending or running");
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Validate => {
            // Strict load: a missing or broken file is an error here, not a
            // fall-back-to-defaults.
            let config = Config::load(&cli.config)?;
            config.validate()?;

            // Building the registry exercises selector and pattern parsing.
            let client = http::create_async_client(&config.http)?;
            let registry = SourceRegistry::from_config(&config, &client)?;

            println!(
                "Config OK: {} source(s): {}",
                config.sources.len(),
                registry.slugs().join(", ")
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_db_path(db_override: &Option<PathBuf>, config: &Config) -> PathBuf {
    db_override
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.db_path))
}

/// Print the operator-facing summary for a finished run.
fn print_report(report: &RunReport) {
    let run = &report.run;
    let c = &run.counters;

    println!();
    println!(
        "Run {} against '{}': {}",
        run.id
            .map_or_else(|| "(dry run)".to_string(), |id| format!("#{id}")),
        run.source_slug,
        run.status.as_str()
    );
    println!("  discovered: {}", c.discovered);
    println!("  queued:     {}", c.queued);
    println!(
        "  skipped:    {} (out of range {}, duplicate {}, queue rejected {})",
        c.skipped, c.out_of_range, c.duplicate, c.queue_rejected
    );
    println!("  errored:    {}", c.errored);
    if let Some(error) = &run.last_error {
        println!("  last error: {error}");
    }
    if run.params.dry_run {
        println!("  dry run: nothing was written");
    }
}
