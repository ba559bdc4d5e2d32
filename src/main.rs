use clap::{Args, Parser, Subcommand};
use hubsync::commands;
use hubsync::db;
use hubsync::db::pool::PoolSettings;
use hubsync::models::repository::RepositoryReference;
use hubsync::services::github_client::{GitHubClientConfig, DEFAULT_BASE_URL};
use hubsync::services::sync_engine::{SyncConfig, SyncReport};
use hubsync::services::sync_session::DEFAULT_WATERMARK_MARGIN_SECS;
use hubsync::AppError;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hubsync")]
#[command(about = "Mirror GitHub issues and pull requests into SQLite")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "HUBSYNC_DATABASE", default_value = db::DEFAULT_DB_FILE)]
    database: PathBuf,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database or bring its schema up to date
    Migrate,

    /// Sync issues and pull requests of one or more repositories
    Sync(SyncArgs),

    /// Mark an unfinished sync as abandoned so a new one can start
    Cancel {
        /// Repositories as owner/name
        #[arg(required = true)]
        repositories: Vec<RepositoryReference>,
    },

    /// Show what the mirror holds and the latest sync attempts
    Status {
        /// Limit to one repository
        repository: Option<RepositoryReference>,

        /// Number of sync log entries to show
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Repositories as owner/name or github.com URLs
    #[arg(required = true)]
    repositories: Vec<RepositoryReference>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// API root (set for GitHub Enterprise)
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Name recorded in the sync log (defaults to the token's login)
    #[arg(long)]
    operator: Option<String>,

    /// Repositories synced at the same time
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Abandon an unfinished earlier sync instead of refusing to start
    #[arg(long)]
    force: bool,

    /// Skip the per-pull-request detail fetch
    #[arg(long)]
    no_pull_details: bool,

    /// Seconds subtracted from the start time to form the next cursor
    #[arg(long, default_value_t = DEFAULT_WATERMARK_MARGIN_SECS)]
    watermark_margin: i64,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancel the token on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing the current page");
            token.cancel();
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &SyncReport) {
    for result in &report.results {
        match &result.error {
            None => println!(
                "{}: ok ({} issues, {} labels, {} milestones, {} pages)",
                result.repository, result.issues, result.labels, result.milestones, result.pages
            ),
            Some(error) => println!("{}: FAILED after {} issues: {}", result.repository, result.issues, error),
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<bool, AppError> {
    let db_path = db::get_db_path(Some(&cli.database));

    match cli.command {
        Commands::Migrate => {
            let pool = db::open(&db_path).await?;
            let response = commands::migrate(&pool).await?;
            if cli.json {
                print_json(&response)?;
            } else if response.applied.is_empty() {
                println!("Schema is current");
            } else {
                for name in &response.applied {
                    println!("Applied {}", name);
                }
            }
            Ok(true)
        }
        Commands::Sync(args) => {
            let pool = db::open_with(&db_path, &PoolSettings::for_concurrency(args.concurrency)).await?;
            let client_config = GitHubClientConfig {
                base_url: args.api_url,
                token: args.token,
                timeout_secs: args.timeout,
                ..Default::default()
            };
            let sync_config = SyncConfig {
                watermark_margin_secs: args.watermark_margin,
                fetch_pull_details: !args.no_pull_details,
                concurrency: args.concurrency,
                operator: args.operator,
                abandon_in_progress: args.force,
                ..Default::default()
            };

            cancel_on_ctrl_c(cancel.clone());
            let report =
                commands::sync_repositories(&pool, client_config, sync_config, &args.repositories, &cancel)
                    .await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            Ok(report.is_success())
        }
        Commands::Cancel { repositories } => {
            let pool = db::open(&db_path).await?;
            let mut responses = Vec::with_capacity(repositories.len());
            for reference in &repositories {
                responses.push(commands::cancel_sync(&pool, reference).await?);
            }
            if cli.json {
                print_json(&responses)?;
            } else {
                for response in &responses {
                    println!("{}: {} unfinished sync(s) abandoned", response.repository, response.abandoned);
                }
            }
            Ok(true)
        }
        Commands::Status { repository, limit } => {
            let pool = db::open(&db_path).await?;
            let status = commands::get_status(&pool, repository.as_ref(), limit).await?;
            if cli.json {
                print_json(&status)?;
                return Ok(true);
            }
            for repo in &status.repositories {
                let last = match &repo.last_attempt {
                    Some(entry) if entry.is_in_progress() => format!("in progress since {}", entry.started_at),
                    Some(entry) => match &entry.error {
                        Some(error) => format!("failed: {}", error),
                        None => format!("completed at {}", entry.completed_at.unwrap_or_default()),
                    },
                    None => "never synced".to_string(),
                };
                let stub = if repo.is_stub { " (stub)" } else { "" };
                println!("{}{}: {} issues, {}", repo.repository, stub, repo.issue_count, last);
            }
            println!("{} link(s) awaiting their target", status.pending_links);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    match run(cli, cancel).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
