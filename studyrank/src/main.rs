// studyrank/src/main.rs
//
// studyrank — fairness-weighted learner rankings with abuse screening
//
// Subcommands:
//   aggregate — one aggregation run now, snapshots written to --output
//               (--dry-run keeps them in memory and prints the global board)
//   schedule  — daily aggregation loop
//   show      — print a stored snapshot (falls back to the newest older one)
//   flag      — reviewer queue of learners above the suspicion threshold
//   monitor   — advisory 24h activity check for one learner
//   validate  — check a candidate session against a learner's history
//
// Usage:
//   studyrank aggregate --sessions sessions.jsonl --users users.jsonl
//   studyrank show --period weekly --scope "Hanbit High"
//   studyrank flag --sessions sessions.jsonl

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod events;
mod report;
mod scheduler;
mod state;
mod store;
mod workers;

use config::AppConfig;
use engine::fraud::FraudDetector;
use engine::streak::streak_stats;
use events::{AlertLevel, Period, Scope, Session};
use scheduler::AggregationScheduler;
use state::window::UserWindow;
use store::file::FileLeaderboardStore;
use store::memory::{MemoryLeaderboardStore, MemorySessionRepository, MemoryUserDirectory};
use store::{LeaderboardStore, SessionRepository};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "studyrank",
    about   = "Fairness-weighted learner rankings with abuse screening",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, global = true, help = "JSON config file (defaults apply when omitted)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one aggregation now
    Aggregate(RunArgs),
    /// Aggregate every day at the configured hour
    Schedule(RunArgs),
    /// Print a stored leaderboard snapshot
    Show {
        #[arg(long, default_value = "/tmp/studyrank_output")]
        output: PathBuf,
        #[arg(long, default_value = "all")]
        period: Period,
        #[arg(long, default_value = "all", help = "\"all\" or a school name")]
        scope: String,
        #[arg(long, help = "Aggregation date (default: today)")]
        date: Option<NaiveDate>,
    },
    /// List learners whose suspicious level reaches the threshold
    Flag {
        #[arg(long)]
        sessions: PathBuf,
    },
    /// Advisory activity check over the last 24 hours
    Monitor {
        #[arg(long)]
        sessions: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long, help = "Evaluation instant, RFC 3339 (default: now)")]
        at: Option<DateTime<Utc>>,
    },
    /// Validate a candidate session (JSON file) against recorded history
    Validate {
        #[arg(long)]
        sessions: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, help = "Session export, one JSON session per line")]
    sessions: PathBuf,

    #[arg(long, help = "User directory export, one JSON profile per line")]
    users: PathBuf,

    #[arg(long, default_value = "/tmp/studyrank_output", help = "Snapshot output directory")]
    output: PathBuf,

    #[arg(long, help = "Aggregate as of this instant, RFC 3339 (aggregate only)")]
    at: Option<DateTime<Utc>>,

    #[arg(long, help = "Keep snapshots in memory and print the global board (aggregate only)")]
    dry_run: bool,
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn build_scheduler(
    config: &AppConfig,
    args:   &RunArgs,
    store:  Arc<dyn LeaderboardStore>,
) -> Result<AggregationScheduler> {
    let sessions = MemorySessionRepository::load_jsonl(&args.sessions).await?;
    let users    = MemoryUserDirectory::load_jsonl(&args.users).await?;
    Ok(AggregationScheduler::new(config, Arc::new(sessions), Arc::new(users), store)?)
}

fn file_store(output: &Path) -> Result<Arc<dyn LeaderboardStore>> {
    let store = FileLeaderboardStore::new(output)
        .with_context(|| format!("opening output {}", output.display()))?;
    Ok(Arc::new(store))
}

async fn aggregate(config: &AppConfig, args: RunArgs) -> Result<()> {
    let now = args.at.unwrap_or_else(Utc::now);
    if args.dry_run {
        let snapshots = Arc::new(MemoryLeaderboardStore::new());
        let scheduler = build_scheduler(config, &args, snapshots.clone()).await?;
        let result = scheduler.run_at(now).await;
        println!("{}", report::run_markdown(&scheduler.status()));
        result?;
        let date = config.calendar.day_of(now);
        let view = store::fetch_leaderboard(snapshots.as_ref(), Period::All, &Scope::Global, date).await?;
        print!("{}", report::leaderboard_markdown(&view));
        return Ok(());
    }

    let scheduler = build_scheduler(config, &args, file_store(&args.output)?).await?;
    let result = scheduler.run_at(now).await;
    println!("{}", report::run_markdown(&scheduler.status()));
    result?;
    println!("  Output: \x1b[90m{}\x1b[0m", args.output.display());
    Ok(())
}

async fn schedule(config: &AppConfig, args: RunArgs) -> Result<()> {
    let scheduler = Arc::new(build_scheduler(config, &args, file_store(&args.output)?).await?);
    info!(
        hour = config.aggregation.run_at_hour,
        output = %args.output.display(),
        "Daily aggregation scheduled"
    );
    scheduler.daily_loop().await;
    Ok(())
}

async fn show(
    config: &AppConfig,
    output: PathBuf,
    period: Period,
    scope:  String,
    date:   Option<NaiveDate>,
) -> Result<()> {
    let snapshots = FileLeaderboardStore::new(&output)?;
    let date      = date.unwrap_or_else(|| config.calendar.day_of(Utc::now()));
    let view      = store::fetch_leaderboard(&snapshots, period, &Scope::from(scope), date).await?;
    print!("{}", report::leaderboard_markdown(&view));
    Ok(())
}

async fn flag(config: &AppConfig, sessions: PathBuf) -> Result<()> {
    let repo     = MemorySessionRepository::load_jsonl(&sessions).await?;
    let detector = FraudDetector::new(config.fraud.clone(), config.calendar.clone());
    let flagged  = detector.flag_suspicious_students(&repo.snapshot());
    print!("{}", report::flagged_markdown(&flagged, config.fraud.suspicious_pattern_threshold));
    Ok(())
}

async fn monitor(config: &AppConfig, sessions: PathBuf, user: String, at: Option<DateTime<Utc>>) -> Result<()> {
    let repo     = MemorySessionRepository::load_jsonl(&sessions).await?;
    let history  = repo.sessions_for(&user, None).await?;
    let detector = FraudDetector::new(config.fraud.clone(), config.calendar.clone());
    let now      = at.unwrap_or_else(Utc::now);
    let alert    = detector.monitor_real_time_activity(&history, now);
    let streak   = streak_stats(&UserWindow::new(&history, &config.calendar), now);

    let color = match alert.alert_level {
        AlertLevel::High   => "\x1b[91;1m",
        AlertLevel::Medium => "\x1b[93;1m",
        AlertLevel::Low    => "\x1b[92m",
    };
    print!("{}{}\x1b[0m", color, report::alert_markdown(&user, &alert));
    println!(
        "  Streak: current {} days, longest {} days, {} active days",
        streak.current, streak.longest, streak.active_days
    );
    Ok(())
}

async fn validate(config: &AppConfig, sessions: PathBuf, candidate_path: PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(&candidate_path)
        .await
        .with_context(|| format!("reading {}", candidate_path.display()))?;
    let candidate: Session = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", candidate_path.display()))?;

    let repo     = MemorySessionRepository::load_jsonl(&sessions).await?;
    let history  = repo.sessions_for(&candidate.user_id, None).await?;
    let detector = FraudDetector::new(config.fraud.clone(), config.calendar.clone());
    let result   = detector.validate_session(&candidate, &history);
    print!("{}", report::validation_markdown(&result));
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("studyrank=info".parse()?))
        .compact().init();

    let cli    = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Aggregate(args) => aggregate(&config, args).await,
        Command::Schedule(args)  => schedule(&config, args).await,
        Command::Show { output, period, scope, date } => show(&config, output, period, scope, date).await,
        Command::Flag { sessions } => flag(&config, sessions).await,
        Command::Monitor { sessions, user, at } => monitor(&config, sessions, user, at).await,
        Command::Validate { sessions, candidate } => validate(&config, sessions, candidate).await,
    }
}
