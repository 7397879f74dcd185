//! Schedule consistency analysis
//!
//! Compares recent bed and wake times against the user's configured schedule,
//! produces a 0-100 consistency score and turns the result into an ordered
//! list of recommendations.
//!
//! The score is `max(0, round(100 - variance / 2))`, where variance is the mean
//! absolute bedtime deviation plus the mean absolute wake deviation (minutes).
//! The divisor and the additive combination are heuristics kept for
//! compatibility with existing scores.

use crate::calendar::{format_clock_minutes, minutes_of_day};
use crate::error::SleepError;
use crate::types::{ScheduleAnalysis, SleepSchedule, SleepSession};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};

/// Default number of recent sessions sampled
pub const DEFAULT_SAMPLE_SIZE: usize = 14;

pub const FIXED_BEDTIME_MESSAGE: &str =
    "Try to go to bed at the same time each night for better sleep quality";
pub const CONSISTENT_SCHEDULE_MESSAGE: &str =
    "Great job! You're maintaining a consistent sleep schedule";

/// Tunables for schedule analysis and recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// How many of the most recent sessions to sample
    pub sample_size: usize,
    /// Divisor applied to the combined deviation before subtracting from 100
    pub variance_divisor: f64,
    /// Average deviation (minutes) above which an adjustment is suggested
    pub deviation_threshold_minutes: f64,
    /// Scores below this trigger the fixed-bedtime suggestion
    pub low_consistency_below: u32,
    /// Scores above this trigger the affirmation
    pub high_consistency_above: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            variance_divisor: 2.0,
            deviation_threshold_minutes: 30.0,
            low_consistency_below: 50,
            high_consistency_above: 80,
        }
    }
}

impl AnalysisConfig {
    /// Load a config from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, SleepError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the 0-100 score or sample nothing
    pub fn validate(&self) -> Result<(), SleepError> {
        if self.sample_size == 0 {
            return Err(SleepError::InvalidConfig(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if !self.variance_divisor.is_finite() || self.variance_divisor <= 0.0 {
            return Err(SleepError::InvalidConfig(format!(
                "variance_divisor must be positive, got {}",
                self.variance_divisor
            )));
        }
        let threshold = self.deviation_threshold_minutes;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(SleepError::InvalidConfig(format!(
                "deviation_threshold_minutes must be non-negative, got {threshold}"
            )));
        }
        Ok(())
    }
}

/// Analyze the most recent sessions against the schedule with default tunables.
///
/// Returns `None` when there is no history.
pub fn analyze_schedule<Tz: TimeZone>(
    sessions: &[SleepSession],
    schedule: &SleepSchedule,
    tz: &Tz,
) -> Option<ScheduleAnalysis> {
    analyze_schedule_with(sessions, schedule, tz, &AnalysisConfig::default())
}

/// Analyze schedule consistency.
///
/// `sessions` are taken to be most-recent-first; the first
/// `config.sample_size` of them form the sample.
pub fn analyze_schedule_with<Tz: TimeZone>(
    sessions: &[SleepSession],
    schedule: &SleepSchedule,
    tz: &Tz,
    config: &AnalysisConfig,
) -> Option<ScheduleAnalysis> {
    let recent = &sessions[..sessions.len().min(config.sample_size)];
    if recent.is_empty() {
        return None;
    }

    let bedtimes: Vec<f64> = recent
        .iter()
        .map(|s| f64::from(minutes_of_day(&s.start, tz)))
        .collect();
    let wake_times: Vec<f64> = recent
        .iter()
        .map(|s| f64::from(minutes_of_day(&s.end, tz)))
        .collect();

    let scheduled_bedtime = schedule.bedtime.minutes_since_midnight();
    let scheduled_wake = schedule.wake_time.minutes_since_midnight();

    let variance = mean_absolute_deviation(&bedtimes, f64::from(scheduled_bedtime))
        + mean_absolute_deviation(&wake_times, f64::from(scheduled_wake));

    let raw_score = 100.0 - variance / config.variance_divisor;
    let consistency_score = if raw_score.is_nan() {
        0
    } else {
        raw_score.round().clamp(0.0, 100.0) as u32
    };

    Some(ScheduleAnalysis {
        average_bedtime_minutes: mean(&bedtimes),
        average_wake_minutes: mean(&wake_times),
        scheduled_bedtime_minutes: scheduled_bedtime,
        scheduled_wake_minutes: scheduled_wake,
        consistency_score,
        sessions_considered: recent.len(),
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_absolute_deviation(values: &[f64], target: f64) -> f64 {
    values.iter().map(|v| (v - target).abs()).sum::<f64>() / values.len() as f64
}

/// Recommendations for an analysis with default thresholds
pub fn recommendations(analysis: Option<&ScheduleAnalysis>) -> Vec<String> {
    recommendations_with(analysis, &AnalysisConfig::default())
}

/// Build the recommendation list.
///
/// Order is fixed: fixed-bedtime advice, bedtime adjustment, wake adjustment,
/// affirmation. Any subset may appear.
pub fn recommendations_with(
    analysis: Option<&ScheduleAnalysis>,
    config: &AnalysisConfig,
) -> Vec<String> {
    let Some(analysis) = analysis else {
        return Vec::new();
    };

    let mut recs = Vec::new();

    if analysis.consistency_score < config.low_consistency_below {
        recs.push(FIXED_BEDTIME_MESSAGE.to_string());
    }

    if analysis.bedtime_deviation_minutes() > config.deviation_threshold_minutes {
        recs.push(format!(
            "Consider adjusting bedtime to {} based on your actual patterns",
            format_clock_minutes(analysis.average_bedtime_minutes)
        ));
    }

    if analysis.wake_deviation_minutes() > config.deviation_threshold_minutes {
        recs.push(format!(
            "Consider adjusting wake time to {} based on your actual patterns",
            format_clock_minutes(analysis.average_wake_minutes)
        ));
    }

    if analysis.consistency_score > config.high_consistency_above {
        recs.push(CONSISTENT_SCHEDULE_MESSAGE.to_string());
    }

    recs
}
