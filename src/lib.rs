//! HealthBuddy Sleep - sleep session aggregation and schedule analysis
//!
//! Turns a user's raw sleep sessions into the numbers the sleep screen shows:
//! session splitting at local midnight → per-day totals → weekly and monthly
//! averages, plus a schedule consistency score with recommendations.
//!
//! ## Modules
//!
//! - **Aggregation**: per-day totals and weekly/monthly averages
//! - **Schedule**: consistency scoring against the configured bed/wake times
//! - **Storage**: per-user persistence behind an injected key-value store
//! - **Tracker**: the facade used by the presentation layer

pub mod aggregator;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod schedule;
pub mod seed;
pub mod store;
pub mod tracker;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::{
    aggregate_by_day, display_average, latest_non_zero, monthly_average, split_across_midnight,
    weekly_averages,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::SleepError;
pub use schedule::{analyze_schedule, recommendations, AnalysisConfig};
pub use store::{FileStore, KeyValueStore, MemoryStore, SleepRepository};
pub use tracker::SleepTracker;
pub use types::{DayTotals, SchedulePatch, ScheduleAnalysis, SleepSchedule, SleepSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "healthbuddy-sleep";
