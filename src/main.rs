use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use log::info;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use engagement_metrics::clock::{clock_for, Clock};
use engagement_metrics::cohort::{summarize_student, summarize_students};
use engagement_metrics::db;
use engagement_metrics::engagement::{engagement_level, engagement_score, improvement_rate};
use engagement_metrics::metrics::{compute_metrics, cutoff_date, DEFAULT_WINDOW_DAYS};
use engagement_metrics::models::ProgressRecord;
use engagement_metrics::report::{build_class_report, build_student_report, format_duration};

#[derive(Parser)]
#[command(name = "engagement-metrics")]
#[command(about = "Student engagement metrics for the learning portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import progress events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank students by engagement
    #[command(group(
        ArgGroup::new("scope")
            .args(["class", "email"])
            .multiple(false)
    ))]
    Metrics {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        since_days: i64,
        /// Evaluate as of the end of this day (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print full snapshots as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report for a class or a single student
    #[command(group(
        ArgGroup::new("scope")
            .args(["class", "email"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        since_days: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Compute metrics for an exported progress document
    Inspect {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        since_days: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            file,
            since_days,
            as_of,
            json,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let progress = ProgressRecord::from_json_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let now = clock_for(as_of)?.now();
            let cutoff = cutoff_date(since_days, now).context("invalid --since-days")?;
            let metrics = compute_metrics(&progress, Some(cutoff), now);
            let score = engagement_score(&metrics);

            if json {
                let output = serde_json::json!({
                    "engagementScore": score,
                    "engagementLevel": engagement_level(score),
                    "improvementRate": improvement_rate(&progress, now),
                    "metrics": metrics,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!(
                    "Engagement {} ({}), {} sessions, {} studied, completion {:.0}%, quiz avg {:.1}",
                    score,
                    engagement_level(score),
                    metrics.sessions_count,
                    format_duration(metrics.total_time_spent),
                    metrics.completion_rate,
                    metrics.quiz_avg_score
                );
            }
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} progress events from {}.", csv.display());
        }
        Commands::Metrics {
            class,
            email,
            since_days,
            as_of,
            limit,
            json,
        } => {
            let pool = connect().await?;
            let now = clock_for(as_of)?.now();
            let cutoff = cutoff_date(since_days, now).context("invalid --since-days")?;
            let students = db::fetch_students(&pool, class.as_deref(), email.as_deref()).await?;
            let summaries = summarize_students(&students, Some(cutoff), now);
            info!("computed metrics for {} students", summaries.len());

            if json {
                let shown: Vec<_> = summaries.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }

            if summaries.is_empty() {
                println!("No students found for this scope.");
                return Ok(());
            }

            println!("Students by engagement since {}:", cutoff.date_naive());
            for summary in summaries.iter().take(limit) {
                let flag = if summary.needs_attention {
                    " [needs attention]"
                } else {
                    ""
                };
                println!(
                    "- {} ({}, {}) score {} ({}), {} sessions, completion {:.0}%, trend {:+}%{}",
                    summary.full_name,
                    summary.email,
                    summary.class_code,
                    summary.engagement_score,
                    summary.engagement_level,
                    summary.metrics.sessions_count,
                    summary.metrics.completion_rate,
                    summary.improvement_rate,
                    flag
                );
            }
        }
        Commands::Report {
            class,
            email,
            since_days,
            as_of,
            out,
        } => {
            let pool = connect().await?;
            let now = clock_for(as_of)?.now();
            let cutoff = cutoff_date(since_days, now).context("invalid --since-days")?;
            let students = db::fetch_students(&pool, class.as_deref(), email.as_deref()).await?;

            let report = if let Some(email) = email.as_deref() {
                let student = students
                    .first()
                    .with_context(|| format!("no student with email {email}"))?;
                build_student_report(&summarize_student(student, Some(cutoff), now), cutoff)
            } else {
                let summaries = summarize_students(&students, Some(cutoff), now);
                build_class_report(class.as_deref(), cutoff, &summaries)
            };

            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
