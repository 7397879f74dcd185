//! Core types for HealthBuddy sleep
//!
//! This module defines the records persisted per user (sessions and schedule)
//! and the derived structures produced by aggregation and schedule analysis.

use crate::error::SleepError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-day sleep totals in hours, keyed by local calendar date
pub type DayTotals = BTreeMap<NaiveDate, f64>;

/// One contiguous interval during which the user was recorded as asleep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    /// Opaque unique identifier
    pub id: String,
    /// When the session started
    #[serde(rename = "startISO")]
    pub start: DateTime<Utc>,
    /// When the session ended
    #[serde(rename = "endISO")]
    pub end: DateTime<Utc>,
    /// Free-text stage label (e.g. "asleep")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl SleepSession {
    /// Create a new session with a fresh identifier.
    ///
    /// Fails with [`SleepError::InvalidSession`] unless `end` is after `start`.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stage: Option<String>,
    ) -> Result<Self, SleepError> {
        let session = Self {
            id: Uuid::new_v4().to_string(),
            start,
            end,
            stage,
        };
        session.validate()?;
        Ok(session)
    }

    /// Check that the session has a positive duration
    pub fn validate(&self) -> Result<(), SleepError> {
        if self.end <= self.start {
            return Err(SleepError::InvalidSession {
                start: self.start.to_rfc3339(),
                end: self.end.to_rfc3339(),
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Session duration in hours (zero for invalid sessions)
    pub fn duration_hours(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Wall-clock time of day with minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, SleepError> {
        if hour > 23 || minute > 59 {
            return Err(SleepError::InvalidScheduleFormat(format!(
                "{hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Minutes elapsed since local midnight
    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = SleepError;

    /// Parse `HH:MM`; the hour may be a single digit, the minute must be two.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SleepError::InvalidScheduleFormat(s.to_string());

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());

        if hour.is_empty() || hour.len() > 2 || !all_digits(hour) {
            return Err(invalid());
        }
        if minute.len() != 2 || !all_digits(minute) {
            return Err(invalid());
        }

        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = SleepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The user's target sleep schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSchedule {
    pub bedtime: ClockTime,
    #[serde(rename = "wakeTime")]
    pub wake_time: ClockTime,
}

impl Default for SleepSchedule {
    fn default() -> Self {
        Self {
            bedtime: ClockTime {
                hour: 22,
                minute: 30,
            },
            wake_time: ClockTime { hour: 7, minute: 0 },
        }
    }
}

impl SleepSchedule {
    /// Build a schedule from two `HH:MM` strings
    pub fn parse(bedtime: &str, wake_time: &str) -> Result<Self, SleepError> {
        Ok(Self {
            bedtime: bedtime.parse()?,
            wake_time: wake_time.parse()?,
        })
    }

    /// Merge a partial edit into this schedule
    pub fn apply(&self, patch: &SchedulePatch) -> Self {
        Self {
            bedtime: patch.bedtime.unwrap_or(self.bedtime),
            wake_time: patch.wake_time.unwrap_or(self.wake_time),
        }
    }
}

/// Partial schedule edit; unset fields keep their stored value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime: Option<ClockTime>,
    #[serde(default, rename = "wakeTime", skip_serializing_if = "Option::is_none")]
    pub wake_time: Option<ClockTime>,
}

/// Traffic-light grading of a consistency score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyBand {
    Good,
    Fair,
    Poor,
}

impl ConsistencyBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            70.. => ConsistencyBand::Good,
            50..=69 => ConsistencyBand::Fair,
            _ => ConsistencyBand::Poor,
        }
    }

    /// Label shown next to the score
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyBand::Good => "Good",
            ConsistencyBand::Fair => "Fair",
            ConsistencyBand::Poor => "Poor",
        }
    }
}

/// How closely recent sleep tracks the configured schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAnalysis {
    /// Mean bedtime over the sample (minutes since local midnight)
    pub average_bedtime_minutes: f64,
    /// Mean wake time over the sample (minutes since local midnight)
    pub average_wake_minutes: f64,
    /// Configured bedtime (minutes since midnight)
    pub scheduled_bedtime_minutes: u32,
    /// Configured wake time (minutes since midnight)
    pub scheduled_wake_minutes: u32,
    /// Heuristic 0-100, higher is more consistent
    pub consistency_score: u32,
    /// Number of sessions in the sample
    pub sessions_considered: usize,
}

impl ScheduleAnalysis {
    pub fn band(&self) -> ConsistencyBand {
        ConsistencyBand::from_score(self.consistency_score)
    }

    pub fn bedtime_deviation_minutes(&self) -> f64 {
        (self.average_bedtime_minutes - f64::from(self.scheduled_bedtime_minutes)).abs()
    }

    pub fn wake_deviation_minutes(&self) -> f64 {
        (self.average_wake_minutes - f64::from(self.scheduled_wake_minutes)).abs()
    }
}

/// Sleep detail for a single calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBreakdown {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub total_minutes: u32,
    /// Sessions that start or end on this date
    pub sessions: Vec<SleepSession>,
}

/// One Sunday-terminated week of a month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSummary {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    /// Number of days of the month in this week (1-7)
    pub days: usize,
    pub average_hours: f64,
}

/// Seven-day chart window starting on a Sunday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekChart {
    pub days: Vec<NaiveDate>,
    /// Rounded sleep minutes per day, aligned with `days`
    pub minutes: Vec<u32>,
}

/// Schedule analysis together with its recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub schedule: SleepSchedule,
    pub analysis: Option<ScheduleAnalysis>,
    pub recommendations: Vec<String>,
}

/// Monthly sleep overview for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepReport {
    pub user_id: String,
    pub year: i32,
    pub month: u32,
    pub generated_at: DateTime<Utc>,
    /// Totals for every day of the month (zero when nothing was logged)
    pub day_totals: DayTotals,
    pub weeks: Vec<WeekSummary>,
    pub monthly_average_hours: f64,
    /// Latest non-zero weekly average, else the monthly average
    pub display_average_hours: f64,
    pub schedule: ScheduleReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clock_time_parsing() {
        let t: ClockTime = "22:30".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 22 * 60 + 30);

        let t: ClockTime = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");

        for bad in ["24:00", "12:60", "1230", "ab:cd", "12:5", "", ":30", "123:00", "-1:30"] {
            assert!(
                matches!(
                    bad.parse::<ClockTime>(),
                    Err(SleepError::InvalidScheduleFormat(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_schedule_serde_uses_app_keys() {
        let schedule = SleepSchedule::parse("23:00", "06:45").unwrap();
        let json = serde_json::to_value(schedule).unwrap();
        assert_eq!(json["bedtime"], "23:00");
        assert_eq!(json["wakeTime"], "06:45");

        let bad = r#"{"bedtime": "25:00", "wakeTime": "07:00"}"#;
        assert!(serde_json::from_str::<SleepSchedule>(bad).is_err());
    }

    #[test]
    fn test_schedule_patch_merges() {
        let schedule = SleepSchedule::default();
        let patch = SchedulePatch {
            wake_time: Some("06:15".parse().unwrap()),
            ..Default::default()
        };
        let merged = schedule.apply(&patch);
        assert_eq!(merged.bedtime.to_string(), "22:30");
        assert_eq!(merged.wake_time.to_string(), "06:15");
    }

    #[test]
    fn test_session_validation() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 16, 6, 30, 0).unwrap();

        let session = SleepSession::new(start, end, Some("asleep".to_string())).unwrap();
        assert!((session.duration_hours() - 7.5).abs() < 1e-9);
        assert!(Uuid::parse_str(&session.id).is_ok());

        assert!(matches!(
            SleepSession::new(end, start, None),
            Err(SleepError::InvalidSession { .. })
        ));
        assert!(SleepSession::new(start, start, None).is_err());
    }

    #[test]
    fn test_session_serde_shape() {
        let json = r#"{
            "id": "1705357800000-1",
            "startISO": "2024-01-15T23:00:00.000Z",
            "endISO": "2024-01-16T06:30:00.000Z",
            "stage": "asleep"
        }"#;
        let session: SleepSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, "1705357800000-1");
        assert_eq!(session.stage.as_deref(), Some("asleep"));
        assert_eq!(
            session.end,
            Utc.with_ymd_and_hms(2024, 1, 16, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_consistency_band() {
        assert_eq!(ConsistencyBand::from_score(100), ConsistencyBand::Good);
        assert_eq!(ConsistencyBand::from_score(70), ConsistencyBand::Good);
        assert_eq!(ConsistencyBand::from_score(69), ConsistencyBand::Fair);
        assert_eq!(ConsistencyBand::from_score(50), ConsistencyBand::Fair);
        assert_eq!(ConsistencyBand::from_score(49), ConsistencyBand::Poor);
        assert_eq!(ConsistencyBand::from_score(0), ConsistencyBand::Poor);

        assert_eq!(ConsistencyBand::Fair.as_str(), "Fair");
        assert_eq!(serde_json::to_string(&ConsistencyBand::Good).unwrap(), "\"good\"");
    }
}
