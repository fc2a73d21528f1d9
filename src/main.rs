use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod classify;
mod db;
mod engine;
mod identity;
mod logging;
mod models;
mod nickname;
mod normalize;
mod report;
mod similarity;
mod snapshot;
mod suppression;
mod trend;

use models::{AggregateStatus, SessionStatus, Snapshot};
use suppression::SuppressionSet;
use trend::{BucketValue, TrendWindow};

#[derive(Parser)]
#[command(name = "coaching-engagement")]
#[command(about = "Coaching program engagement tracker for Group Scholar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Read records from a CSV snapshot directory instead of Postgres
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Evaluation time (RFC 3339 or YYYY-MM-DD); defaults to the current time
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    /// Hide a person by id or email (repeatable)
    #[arg(long = "suppress", global = true)]
    suppress: Vec<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import roster, session or survey rows from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: db::ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Persist a suppression for an id or email
    Suppress { identifier: String },
    /// List per-person engagement profiles
    Engagement {
        #[arg(long)]
        program: Option<String>,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show monthly session outcome trends
    Trend {
        #[arg(long)]
        program: Option<String>,
        #[arg(long, default_value_t = 6)]
        months: usize,
        /// Show each outcome as a share of the month's sessions
        #[arg(long)]
        percent: bool,
        /// Show completed sessions and coached minutes instead
        #[arg(long, conflicts_with = "percent")]
        billing: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        program: Option<String>,
        #[arg(long, default_value_t = 6)]
        months: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json)?;
    let now = cli.now.unwrap_or_else(Utc::now);

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(&cli).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&cli).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let pool = connect(&cli).await?;
            let inserted = db::import_csv(&pool, *kind, csv).await?;
            println!("Inserted {inserted} rows from {}.", csv.display());
        }
        Commands::Suppress { identifier } => {
            let pool = connect(&cli).await?;
            if db::add_suppression(&pool, identifier).await? {
                println!("Suppressed {identifier}.");
            } else {
                println!("{identifier} was already suppressed.");
            }
        }
        Commands::Engagement {
            program,
            limit,
            json,
        } => {
            let (snapshot, suppression) = load_snapshot(&cli).await?;
            let outcome = engine::ingest(&snapshot, &suppression, now);
            let outcome = report::scoped(&outcome, program.as_deref());

            if *json {
                let payload = serde_json::json!({
                    "aggregates": outcome.aggregates,
                    "stats": outcome.stats,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if outcome.aggregates.is_empty() {
                println!("No people found for this snapshot.");
                return Ok(());
            }

            println!("Engagement by person:");
            for aggregate in outcome.aggregates.iter().take(*limit) {
                let status = match aggregate.status {
                    AggregateStatus::Active => "active",
                    AggregateStatus::PendingMatch => "pending match",
                };
                let last_seen = aggregate
                    .latest_session_date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "- {} ({}, {}) {}: {} completed, {} no-show, {} scheduled of {} sessions, last {}",
                    aggregate.display_name,
                    aggregate.email.as_deref().unwrap_or(&aggregate.key),
                    aggregate.program,
                    status,
                    aggregate.completed,
                    aggregate.no_show,
                    aggregate.scheduled,
                    aggregate.total,
                    last_seen
                );
            }
            if outcome.stats.skipped.total() > 0 {
                println!(
                    "Skipped {} records without an email or name.",
                    outcome.stats.skipped.total()
                );
            }
        }
        Commands::Trend {
            program,
            months,
            percent,
            billing,
            json,
        } => {
            let (snapshot, suppression) = load_snapshot(&cli).await?;
            let outcome = engine::ingest(&snapshot, &suppression, now);
            let outcome = report::scoped(&outcome, program.as_deref());
            let window = TrendWindow::months(*months);
            let buckets = if *billing {
                report::billing_trend(&outcome, window, now)
            } else {
                report::session_trend(&outcome, window, now)
            };

            if *json {
                println!("{}", serde_json::to_string_pretty(&buckets)?);
                return Ok(());
            }

            if *billing {
                println!("Completed sessions and coached minutes by month:");
                for bucket in &buckets {
                    println!(
                        "- {}: {} sessions, {} minutes",
                        bucket.label,
                        bucket.events,
                        bucket.count(&SessionStatus::Completed)
                    );
                }
                return Ok(());
            }

            let mode = if *percent {
                BucketValue::Percentage
            } else {
                BucketValue::Count
            };
            println!("Session outcomes by month:");
            for bucket in &buckets {
                let cells: Vec<String> = [
                    SessionStatus::Completed,
                    SessionStatus::NoShow,
                    SessionStatus::Scheduled,
                ]
                .iter()
                .map(|status| {
                    let value = bucket.value(status, mode);
                    match mode {
                        BucketValue::Count => format!("{} {}", status.label(), value as u64),
                        BucketValue::Percentage => format!("{} {:.1}%", status.label(), value),
                    }
                })
                .collect();
                println!("- {}: {}", bucket.label, cells.join(", "));
            }
        }
        Commands::Report {
            program,
            months,
            out,
        } => {
            let (snapshot, suppression) = load_snapshot(&cli).await?;
            let outcome = engine::ingest(&snapshot, &suppression, now);
            let outcome = report::scoped(&outcome, program.as_deref());
            let report = report::build_report(
                program.as_deref(),
                now,
                TrendWindow::months(*months),
                &outcome,
            );
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_snapshot(cli: &Cli) -> anyhow::Result<(Snapshot, SuppressionSet)> {
    let (snapshot, mut suppression) = match &cli.snapshot {
        Some(dir) => snapshot::load_dir(dir)?,
        None => {
            let pool = connect(cli).await?;
            db::fetch_snapshot(&pool).await?
        }
    };

    for identifier in &cli.suppress {
        suppression.insert(identifier);
    }
    if !suppression.is_empty() {
        tracing::debug!(identifiers = suppression.len(), "applying suppression set");
    }
    Ok((snapshot, suppression))
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    normalize::parse_timestamp(value)
        .ok_or_else(|| format!("expected an RFC 3339 timestamp or YYYY-MM-DD date, got {value:?}"))
}
