//! omni - command-line client for the Academy/College teacher portal

mod cli;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cli::{DivisionArg, MarkKindArg, PresenceArg, WeekTarget};
use omni_core::cache::WeekPhase;
use omni_core::{
    Credentials, DegradedState, Portal, PortalConfig, SqliteWeekStore, WeekStore, WriteReceipt,
};
use omni_types::Division;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "omni",
    version,
    about = "Teacher portal client for the Academy and College divisions",
    long_about = "Logs in to both divisions of the teacher portal with one account and\n\
                  shows them as a single timetable.\n\
                  \n\
                  Examples:\n\
                    omni schedule                         # Current week, both divisions\n\
                    omni schedule --week 1                # Next week\n\
                    omni schedule --date 2025-05-21       # One day\n\
                    omni counters                         # Homework and reviews waiting\n\
                    omni attend --division college --period 2 --student 42 --status late\n\
                    omni clear-cache                      # Drop cached weeks\n\
                  \n\
                  Environment Variables:\n\
                    OMNI_USERNAME / OMNI_PASSWORD         # Portal account\n\
                    OMNI_CONFIG                           # Config file (TOML)\n\
                    OMNI_CACHE_DIR                        # Week store directory\n\
                    OMNI_BASE_URL                         # Portal base URL\n\
                    RUST_LOG                              # Log filter (default: warn)"
)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Path to the config file (default: <config dir>/omniclient/config.toml)
    #[arg(long, global = true, env = "OMNI_CONFIG")]
    config: Option<PathBuf>,

    /// Portal login
    #[arg(long, short = 'u', global = true, env = "OMNI_USERNAME")]
    username: Option<String>,

    /// Portal password
    #[arg(long, global = true, env = "OMNI_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory of the week store
    #[arg(long, global = true, env = "OMNI_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Portal base URL
    #[arg(long, global = true, env = "OMNI_BASE_URL")]
    base_url: Option<String>,

    /// Login attempts while the portal is unreachable
    #[arg(long, global = true, default_value = "3")]
    retries: u32,

    /// Disable ANSI colors
    #[arg(long, global = true, env = "OMNI_NO_COLOR")]
    no_color: bool,

    /// More logging (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Mode {
    /// Show the merged timetable of one week
    Schedule {
        /// Week offset from the current week
        #[arg(long, short = 'w', allow_hyphen_values = true, conflicts_with = "date")]
        week: Option<i32>,
        /// Show only this day (YYYY-MM-DD)
        #[arg(long, short = 'd')]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Homework, reviews and tasks waiting in each division
    Counters {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the teacher profile
    Profile,
    /// Record a student's attendance
    Attend {
        #[arg(long, value_enum)]
        division: DivisionArg,
        /// Lesson period of today's schedule
        #[arg(long)]
        period: u32,
        /// Student id
        #[arg(long)]
        student: String,
        #[arg(long, value_enum, default_value = "present")]
        status: PresenceArg,
    },
    /// Give a student a mark
    Mark {
        #[arg(long, value_enum)]
        division: DivisionArg,
        #[arg(long)]
        period: u32,
        #[arg(long)]
        student: String,
        #[arg(long, value_enum, default_value = "classwork")]
        kind: MarkKindArg,
        /// Mark on the division's scale (Academy 1-12, College 1-5)
        value: u8,
    },
    /// Send a review to a student waiting for one
    Review {
        #[arg(long, value_enum)]
        division: DivisionArg,
        #[arg(long)]
        student: String,
        /// Review text
        comment: String,
    },
    /// Delete every cached week of the user
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;

    match cli.mode {
        Mode::Schedule {
            week,
            ref date,
            json,
        } => {
            let today = chrono::Local::now().date_naive();
            let target = WeekTarget::resolve(week, date.as_deref(), today)?;
            run_schedule(&cli, config, target, json).await?;
        }
        Mode::Counters { json } => {
            run_counters(&cli, config, json).await?;
        }
        Mode::Profile => {
            run_profile(&cli, config).await?;
        }
        Mode::Attend {
            division,
            period,
            ref student,
            status,
        } => {
            run_attend(&cli, config, division.into(), period, student, status).await?;
        }
        Mode::Mark {
            division,
            period,
            ref student,
            kind,
            value,
        } => {
            run_mark(&cli, config, division.into(), period, student, kind, value).await?;
        }
        Mode::Review {
            division,
            ref student,
            ref comment,
        } => {
            run_review(&cli, config, division.into(), student, comment).await?;
        }
        Mode::ClearCache => {
            run_clear_cache(&cli, config)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "omni=info,omni_core=info,warn",
        _ => "omni=debug,omni_core=debug,info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// File config with command-line overrides applied
fn load_config(cli: &Cli) -> Result<PortalConfig> {
    let mut config = PortalConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if let Some(username) = &cli.username {
        config.username = Some(username.clone());
    }
    config.validate()?;
    debug!(base_url = %config.base_url, "Config loaded");
    Ok(config)
}

fn username(config: &PortalConfig) -> Result<String> {
    config
        .username
        .clone()
        .context("No username: pass --username, set OMNI_USERNAME or `username` in the config")
}

fn open_store(config: &PortalConfig) -> Result<Arc<SqliteWeekStore>> {
    let dir = config.cache_path()?;
    let store = SqliteWeekStore::new(&dir)
        .with_context(|| format!("Failed to open week store in {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn open_portal(cli: &Cli, config: PortalConfig) -> Result<Portal> {
    let username = username(&config)?;
    let password = cli
        .password
        .clone()
        .context("No password: pass --password or set OMNI_PASSWORD")?;
    let store = open_store(&config)?;
    Ok(Portal::new(config, Credentials::new(username, password), store)?)
}

/// Log in, reporting a partially available portal on stderr
async fn login(portal: &Portal, cli: &Cli) -> Result<()> {
    let outcome = portal
        .login(Some(cli.retries.max(1)))
        .await
        .context("Login failed")?;
    match outcome.degraded_state() {
        DegradedState::PartialData { reason, .. } => eprintln!("⚠ Partial login: {}", reason),
        state => info!(state = ?state, "Logged in"),
    }
    Ok(())
}

async fn run_schedule(
    cli: &Cli,
    config: PortalConfig,
    target: WeekTarget,
    json: bool,
) -> Result<()> {
    let portal = open_portal(cli, config)?;
    let weeks = Arc::clone(portal.weeks());

    // Show the stored copy even if the portal is unreachable
    weeks.preload_window(target.offset);
    if let Err(e) = login(&portal, cli).await {
        if weeks.get(target.offset).is_none() {
            return Err(e);
        }
        eprintln!("⚠ {:#}, showing cached week", e);
    }

    let focused = weeks
        .refresh(target.offset)
        .into_iter()
        .chain(weeks.ensure_adjacent_loaded(target.offset));
    for handle in focused.collect::<Vec<_>>() {
        handle.await.context("Week refresh task panicked")?;
    }

    let status = weeks.status(target.offset);
    debug!(offset = target.offset, phase = ?status.phase, "Week ready");
    let Some(week) = weeks.get(target.offset) else {
        match status.phase {
            WeekPhase::Error(reason) => bail!("Week {} unavailable: {}", target.offset, reason),
            _ => bail!("Week {} unavailable", target.offset),
        }
    };

    println!("{}", cli::format_week(&week, target.date, json, cli.no_color));

    if !json {
        for failure in &status.failures {
            eprintln!("⚠ {} missing: {}", failure.division, failure.message);
        }
        if let Some(updated) = status.updated_at {
            eprintln!(
                "\nWeek {:+} · updated {}",
                target.offset,
                updated.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

async fn run_counters(cli: &Cli, config: PortalConfig, json: bool) -> Result<()> {
    let portal = open_portal(cli, config)?;
    login(&portal, cli).await?;

    let counters = portal.counters().await;
    println!("{}", cli::format_counters(&counters, json));
    Ok(())
}

async fn run_profile(cli: &Cli, config: PortalConfig) -> Result<()> {
    let portal = open_portal(cli, config)?;
    login(&portal, cli).await?;

    let (division, info) = portal.profile().await?;
    println!("Teacher:  {}", info.full_name.as_deref().unwrap_or("-"));
    println!("Division: {}", division);
    if let Some(photo) = info.photo_url.as_deref() {
        println!("Photo:    {}", photo);
    }
    Ok(())
}

async fn run_attend(
    cli: &Cli,
    config: PortalConfig,
    division: Division,
    period: u32,
    student_id: &str,
    status: PresenceArg,
) -> Result<()> {
    let portal = open_portal(cli, config)?;
    login(&portal, cli).await?;

    let roster = portal.presents(division, period).await?;
    let student = cli::find_present(&roster, division, student_id)?;
    let receipt = portal
        .write_back()
        .record_visit(division, student, status.into());
    report(receipt, &format!("{} marked {:?}", student.fio_stud, status)).await
}

async fn run_mark(
    cli: &Cli,
    config: PortalConfig,
    division: Division,
    period: u32,
    student_id: &str,
    kind: MarkKindArg,
    value: u8,
) -> Result<()> {
    let portal = open_portal(cli, config)?;
    login(&portal, cli).await?;

    let roster = portal.presents(division, period).await?;
    let student = cli::find_present(&roster, division, student_id)?;
    let receipt = portal
        .write_back()
        .record_mark(division, student, kind.into(), value)?;
    report(receipt, &format!("{} got {}", student.fio_stud, value)).await
}

async fn run_review(
    cli: &Cli,
    config: PortalConfig,
    division: Division,
    student_id: &str,
    comment: &str,
) -> Result<()> {
    let portal = open_portal(cli, config)?;
    login(&portal, cli).await?;

    let counters = portal
        .counters()
        .await
        .get(division)
        .as_ref()
        .map(|c| c.reviews.students.clone())
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let student = cli::find_review_student(&counters, division, student_id)?;
    let receipt = portal
        .write_back()
        .send_review(division, student, comment)?;
    report(receipt, &format!("Review sent to {}", student.fio_stud)).await
}

/// Wait for a queued write and print its outcome
async fn report(receipt: WriteReceipt, done: &str) -> Result<()> {
    match receipt.wait().await {
        Ok(()) => {
            println!("✓ {}", done);
            Ok(())
        }
        Err(failure) => bail!("{} write failed: {}", failure.division, failure.message),
    }
}

fn run_clear_cache(cli: &Cli, config: PortalConfig) -> Result<()> {
    let username = username(&config)?;
    let store = open_store(&config)?;
    let removed = store
        .clear(&username)
        .context("Failed to clear week store")?;

    println!("✓ Cleared {} cached weeks for {}", removed, username);
    if cli.verbose > 0 {
        println!("   Location: {}", config.cache_path()?.display());
    }
    Ok(())
}
