//! hbsleep CLI - Command-line interface for HealthBuddy sleep
//!
//! Commands:
//! - log: Record a sleep session
//! - schedule: Show or update the bed/wake schedule
//! - report: Monthly overview (daily totals, weekly and monthly averages)
//! - week: Seven-day chart window
//! - day: Detail for a single date
//! - analyze: Schedule consistency and recommendations
//! - seed: Populate sample history for a new user
//! - reset: Delete all data for a user
//! - doctor: Diagnose storage and configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use tracing_subscriber::EnvFilter;

use healthbuddy_sleep::calendar::{format_clock_minutes, format_hours, parse_utc_offset};
use healthbuddy_sleep::types::{ClockTime, ScheduleReport, SleepReport};
use healthbuddy_sleep::{
    AnalysisConfig, FileStore, SchedulePatch, SleepError, SleepRepository, SleepTracker,
    SystemClock, PRODUCER_NAME, VERSION,
};

/// Environment variable holding the log filter
const LOG_ENV: &str = "HBSLEEP_LOG";

/// hbsleep - Sleep tracking and schedule analysis
#[derive(Parser)]
#[command(name = "hbsleep")]
#[command(author = "HealthBuddy Team")]
#[command(version = VERSION)]
#[command(about = "Track sleep sessions and analyze schedule consistency", long_about = None)]
struct Cli {
    /// Directory holding per-user sleep data
    #[arg(long, global = true, default_value = ".hbsleep")]
    data_dir: PathBuf,

    /// User whose data to read and write
    #[arg(long, global = true, default_value = "default")]
    user: String,

    /// UTC offset for calendar days, e.g. "+02:00" (defaults to the local offset)
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// Analysis settings (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a sleep session
    Log {
        /// Start time (RFC 3339, or YYYY-MM-DDTHH:MM in the user's offset)
        #[arg(long)]
        start: String,

        /// End time (RFC 3339, or YYYY-MM-DDTHH:MM in the user's offset)
        #[arg(long)]
        end: String,

        /// Optional stage label
        #[arg(long)]
        stage: Option<String>,
    },

    /// Show the schedule, or update it when a time is given
    Schedule {
        /// New bedtime (HH:MM)
        #[arg(long)]
        bedtime: Option<String>,

        /// New wake time (HH:MM)
        #[arg(long)]
        wake_time: Option<String>,
    },

    /// Monthly overview
    Report {
        /// Year (defaults to the current one)
        #[arg(long)]
        year: Option<i32>,

        /// Month 1-12 (defaults to the current one)
        #[arg(long)]
        month: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Seven-day chart starting on Sunday
    Week {
        /// Weeks relative to the current one (-1 is last week)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i32,
    },

    /// Sleep detail for one date
    Day {
        /// Date (YYYY-MM-DD)
        date: String,
    },

    /// Schedule consistency and recommendations
    Analyze {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Populate sample history if the user has none
    Seed,

    /// Delete all data for the user
    Reset,

    /// Diagnose storage and configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

type Tracker = SleepTracker<FileStore, SystemClock, FixedOffset>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), HbSleepCliError> {
    let tz = resolve_offset(cli.utc_offset.as_deref())?;

    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(&cli.data_dir, &cli.user, cli.config.as_deref(), &tz, json);
    }

    let config = load_config(cli.config.as_deref())?;
    let repository = SleepRepository::new(FileStore::new(&cli.data_dir), cli.user);
    let tracker = SleepTracker::with_config(repository, SystemClock, tz, config);

    match cli.command {
        Commands::Log { start, end, stage } => cmd_log(&tracker, &tz, &start, &end, stage),
        Commands::Schedule { bedtime, wake_time } => cmd_schedule(&tracker, bedtime, wake_time),
        Commands::Report { year, month, json } => cmd_report(&tracker, year, month, json),
        Commands::Week { offset } => cmd_week(&tracker, offset),
        Commands::Day { date } => cmd_day(&tracker, &date),
        Commands::Analyze { json } => cmd_analyze(&tracker, json),
        Commands::Seed => cmd_seed(&tracker),
        Commands::Reset => cmd_reset(&tracker),
        Commands::Doctor { .. } => Ok(()),
    }
}

fn resolve_offset(arg: Option<&str>) -> Result<FixedOffset, HbSleepCliError> {
    match arg {
        Some(s) => Ok(parse_utc_offset(s)?),
        None => Ok(Local::now().offset().fix()),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, HbSleepCliError> {
    match path {
        Some(path) => Ok(AnalysisConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn cmd_log(
    tracker: &Tracker,
    tz: &FixedOffset,
    start: &str,
    end: &str,
    stage: Option<String>,
) -> Result<(), HbSleepCliError> {
    let start = parse_instant(start, tz)?;
    let end = parse_instant(end, tz)?;

    let session = tracker.log_session(start, end, stage)?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

fn cmd_schedule(
    tracker: &Tracker,
    bedtime: Option<String>,
    wake_time: Option<String>,
) -> Result<(), HbSleepCliError> {
    let schedule = if bedtime.is_none() && wake_time.is_none() {
        tracker.repository().load_schedule()?
    } else {
        let patch = SchedulePatch {
            bedtime: bedtime.as_deref().map(str::parse::<ClockTime>).transpose()?,
            wake_time: wake_time.as_deref().map(str::parse::<ClockTime>).transpose()?,
        };
        tracker.update_schedule(&patch)?
    };

    println!("Bedtime:   {}", schedule.bedtime);
    println!("Wake time: {}", schedule.wake_time);
    Ok(())
}

fn cmd_report(
    tracker: &Tracker,
    year: Option<i32>,
    month: Option<u32>,
    json: bool,
) -> Result<(), HbSleepCliError> {
    let today = tracker.today();
    let report = tracker.month_report(
        year.unwrap_or_else(|| today.year()),
        month.unwrap_or_else(|| today.month()),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SleepReport) {
    let title = format!("Sleep Report {}-{:02} ({})", report.year, report.month, report.user_id);
    println!("{title}");
    println!("{}", "=".repeat(title.len()));

    println!("\nWeekly averages:");
    for (i, week) in report.weeks.iter().enumerate() {
        println!(
            "  Week {} ({} to {}): {}",
            i + 1,
            week.first_day.format("%b %d"),
            week.last_day.format("%b %d"),
            format_hours(week.average_hours)
        );
    }

    println!("\nMonthly average: {}", format_hours(report.monthly_average_hours));
    println!("Headline:        {}", format_hours(report.display_average_hours));
    println!();
    print_schedule_report(&report.schedule);
}

fn print_schedule_report(report: &ScheduleReport) {
    println!(
        "Schedule: bed {} / wake {}",
        report.schedule.bedtime, report.schedule.wake_time
    );

    let Some(analysis) = &report.analysis else {
        println!("No sleep history to analyze yet");
        return;
    };

    println!(
        "Consistency: {} ({}) over {} nights",
        analysis.consistency_score,
        analysis.band().as_str(),
        analysis.sessions_considered
    );
    println!(
        "Average bedtime {} / wake {}",
        format_clock_minutes(analysis.average_bedtime_minutes),
        format_clock_minutes(analysis.average_wake_minutes)
    );

    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for rec in &report.recommendations {
            println!("  - {rec}");
        }
    }
}

fn cmd_week(tracker: &Tracker, offset: i32) -> Result<(), HbSleepCliError> {
    let chart = tracker.week_chart(offset)?;

    for (day, minutes) in chart.days.iter().zip(&chart.minutes) {
        let bar = "#".repeat((*minutes / 30) as usize);
        println!(
            "{} {:>7}  {bar}",
            day.format("%a %m-%d"),
            format_hours(f64::from(*minutes) / 60.0)
        );
    }
    Ok(())
}

fn cmd_day(tracker: &Tracker, date: &str) -> Result<(), HbSleepCliError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| SleepError::DateParseError(format!("{date}: {e}")))?;
    let breakdown = tracker.day(date)?;
    println!("{}", serde_json::to_string_pretty(&breakdown)?);
    Ok(())
}

fn cmd_analyze(tracker: &Tracker, json: bool) -> Result<(), HbSleepCliError> {
    let report = tracker.schedule_report()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_schedule_report(&report);
    }
    Ok(())
}

fn cmd_seed(tracker: &Tracker) -> Result<(), HbSleepCliError> {
    if tracker.seed_if_empty(&mut rand::thread_rng())? {
        println!("Seeded sample history for {}", tracker.repository().user_id());
    } else {
        println!("User {} already has data; nothing seeded", tracker.repository().user_id());
    }
    Ok(())
}

fn cmd_reset(tracker: &Tracker) -> Result<(), HbSleepCliError> {
    tracker.reset()?;
    println!("Deleted sleep data for {}", tracker.repository().user_id());
    Ok(())
}

fn cmd_doctor(
    data_dir: &Path,
    user: &str,
    config: Option<&Path>,
    tz: &FixedOffset,
    json: bool,
) -> Result<(), HbSleepCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("hbsleep version {}", VERSION),
    });

    checks.push(DoctorCheck {
        name: "utc_offset".to_string(),
        status: CheckStatus::Ok,
        message: format!("Calendar days use UTC{}", tz),
    });

    // Data directory
    if data_dir.is_dir() {
        checks.push(DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("Data directory {} exists", data_dir.display()),
        });
    } else if data_dir.exists() {
        checks.push(DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not a directory", data_dir.display()),
        });
    } else {
        checks.push(DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "Data directory {} does not exist yet (created on first write)",
                data_dir.display()
            ),
        });
    }

    // Stored data for the user
    if data_dir.is_dir() {
        let repository = SleepRepository::new(FileStore::new(data_dir), user);
        match repository.load_sessions() {
            Ok(sessions) => checks.push(DoctorCheck {
                name: "sessions".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} sessions stored for {}", sessions.len(), user),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "sessions".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load sessions: {}", e),
            }),
        }

        match repository.load_schedule() {
            Ok(schedule) => checks.push(DoctorCheck {
                name: "schedule".to_string(),
                status: CheckStatus::Ok,
                message: format!("Schedule {} to {}", schedule.bedtime, schedule.wake_time),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "schedule".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load schedule: {}", e),
            }),
        }
    }

    // Analysis config
    if let Some(config_path) = config {
        match load_config(Some(config_path)) {
            Ok(config) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Config valid (sampling {} sessions)", config.sample_size),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", CliError::from(e).message),
            }),
        }
    }

    let stdout_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY (text reports)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a pipe (use --json for machine-readable output)".to_string(),
        }
    };
    checks.push(stdout_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("hbsleep Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HbSleepCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

/// Parse an RFC 3339 instant, or a bare local date-time in the given offset
fn parse_instant(s: &str, tz: &FixedOffset) -> Result<DateTime<Utc>, SleepError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|e| SleepError::DateParseError(format!("{s}: {e}")))?;

    tz.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SleepError::DateParseError(s.to_string()))
}

// Error types

#[derive(Debug)]
enum HbSleepCliError {
    Io(io::Error),
    Sleep(SleepError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for HbSleepCliError {
    fn from(e: io::Error) -> Self {
        HbSleepCliError::Io(e)
    }
}

impl From<SleepError> for HbSleepCliError {
    fn from(e: SleepError) -> Self {
        HbSleepCliError::Sleep(e)
    }
}

impl From<serde_json::Error> for HbSleepCliError {
    fn from(e: serde_json::Error) -> Self {
        HbSleepCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HbSleepCliError> for CliError {
    fn from(e: HbSleepCliError) -> Self {
        match e {
            HbSleepCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HbSleepCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HbSleepCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            HbSleepCliError::Sleep(e) => {
                let (code, hint) = match &e {
                    SleepError::InvalidSession { .. } => {
                        ("INVALID_SESSION", "The end time must be after the start time")
                    }
                    SleepError::InvalidScheduleFormat(_) => {
                        ("INVALID_SCHEDULE", "Use 24-hour HH:MM, e.g. 22:30")
                    }
                    SleepError::InvalidTimezone(_) => {
                        ("INVALID_TIMEZONE", "Use an offset such as +02:00, -0530 or UTC")
                    }
                    SleepError::InvalidMonth { .. } => ("INVALID_MONTH", "Months run from 1 to 12"),
                    SleepError::InvalidConfig(_) => (
                        "INVALID_CONFIG",
                        "Check the --config file; sample_size and variance_divisor must be positive",
                    ),
                    SleepError::DateParseError(_) => {
                        ("DATE_PARSE_ERROR", "Use YYYY-MM-DD or RFC 3339 date-times")
                    }
                    SleepError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    SleepError::IoError(_) => ("IO_ERROR", "Check --data-dir and permissions"),
                    SleepError::StorageError(_) => {
                        ("STORAGE_ERROR", "Run 'hbsleep doctor' for details")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
