//! Tracker orchestration
//!
//! This module provides the main entry point used by the presentation layer.
//! It loads a user's sessions and schedule from the repository, reads "today"
//! from the injected clock and runs the pure aggregation and analysis stages.
//!
//! Nothing is cached: every call recomputes from storage.

use crate::aggregator::{
    aggregate_by_day, day_breakdown, display_average, monthly_average, week_totals_minutes,
    weekly_summaries,
};
use crate::calendar::{month_days, week_window};
use crate::clock::Clock;
use crate::error::SleepError;
use crate::schedule::{analyze_schedule_with, recommendations_with, AnalysisConfig};
use crate::seed::seed_if_empty;
use crate::store::{KeyValueStore, SleepRepository};
use crate::types::{
    DayBreakdown, DayTotals, SchedulePatch, ScheduleReport, SleepReport, SleepSchedule,
    SleepSession, WeekChart,
};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rand::Rng;
use tracing::debug;

/// Sleep tracking facade for one user.
///
/// Combines storage, a clock and the user's time zone.
pub struct SleepTracker<S: KeyValueStore, C: Clock, Tz: TimeZone> {
    repository: SleepRepository<S>,
    clock: C,
    tz: Tz,
    config: AnalysisConfig,
}

impl<S: KeyValueStore, C: Clock, Tz: TimeZone> SleepTracker<S, C, Tz> {
    /// Create a tracker with default analysis settings
    pub fn new(repository: SleepRepository<S>, clock: C, tz: Tz) -> Self {
        Self::with_config(repository, clock, tz, AnalysisConfig::default())
    }

    /// Create a tracker with custom analysis settings
    pub fn with_config(
        repository: SleepRepository<S>,
        clock: C,
        tz: Tz,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            repository,
            clock,
            tz,
            config,
        }
    }

    pub fn repository(&self) -> &SleepRepository<S> {
        &self.repository
    }

    /// Today's date in the user's time zone
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    /// Record a new sleep session
    pub fn log_session(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stage: Option<String>,
    ) -> Result<SleepSession, SleepError> {
        let session = SleepSession::new(start, end, stage)?;
        self.repository.add_session(session.clone())?;
        Ok(session)
    }

    /// Merge a schedule edit and return the stored result
    pub fn update_schedule(&self, patch: &SchedulePatch) -> Result<SleepSchedule, SleepError> {
        self.repository.save_schedule(patch)
    }

    /// Populate sample history for a brand-new user
    pub fn seed_if_empty<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<bool, SleepError> {
        seed_if_empty(&self.repository, self.today(), &self.tz, rng)
    }

    /// Delete all of this user's sleep data
    pub fn reset(&self) -> Result<(), SleepError> {
        self.repository.reset()
    }

    /// Sleep hours per local date over the whole history
    pub fn day_totals(&self) -> Result<DayTotals, SleepError> {
        let sessions = self.repository.load_sessions()?;
        Ok(aggregate_by_day(&sessions, &self.tz))
    }

    /// Schedule analysis and recommendations for the current history
    pub fn schedule_report(&self) -> Result<ScheduleReport, SleepError> {
        let sessions = self.repository.load_sessions()?;
        let schedule = self.repository.load_schedule()?;
        Ok(self.build_schedule_report(&sessions, schedule))
    }

    fn build_schedule_report(
        &self,
        sessions: &[SleepSession],
        schedule: SleepSchedule,
    ) -> ScheduleReport {
        let analysis = analyze_schedule_with(sessions, &schedule, &self.tz, &self.config);
        let recommendations = recommendations_with(analysis.as_ref(), &self.config);

        ScheduleReport {
            schedule,
            analysis,
            recommendations,
        }
    }

    /// Full overview for one month
    pub fn month_report(&self, year: i32, month: u32) -> Result<SleepReport, SleepError> {
        let days = month_days(year, month)?;
        let sessions = self.repository.load_sessions()?;
        let schedule = self.repository.load_schedule()?;

        let all_totals = aggregate_by_day(&sessions, &self.tz);
        let day_totals: DayTotals = days
            .iter()
            .map(|d| (*d, all_totals.get(d).copied().unwrap_or(0.0)))
            .collect();

        let weeks = weekly_summaries(&days, &day_totals);
        let weekly: Vec<f64> = weeks.iter().map(|w| w.average_hours).collect();
        let monthly = monthly_average(&days, &day_totals);

        debug!(
            user = self.repository.user_id(),
            year,
            month,
            sessions = sessions.len(),
            "built monthly sleep report"
        );

        Ok(SleepReport {
            user_id: self.repository.user_id().to_string(),
            year,
            month,
            generated_at: self.clock.now(),
            day_totals,
            weeks,
            monthly_average_hours: monthly,
            display_average_hours: display_average(&weekly, monthly),
            schedule: self.build_schedule_report(&sessions, schedule),
        })
    }

    /// Overview for the month containing today
    pub fn current_month_report(&self) -> Result<SleepReport, SleepError> {
        let today = self.today();
        self.month_report(today.year(), today.month())
    }

    /// Sunday-start chart window, `offset` weeks from the current one
    pub fn week_chart(&self, offset: i32) -> Result<WeekChart, SleepError> {
        let days = week_window(self.today(), offset);
        let totals = self.day_totals()?;
        let minutes = week_totals_minutes(&days, &totals);
        Ok(WeekChart { days, minutes })
    }

    /// Detail for a single date
    pub fn day(&self, date: NaiveDate) -> Result<DayBreakdown, SleepError> {
        let sessions = self.repository.load_sessions()?;
        let totals = aggregate_by_day(&sessions, &self.tz);
        Ok(day_breakdown(&sessions, &totals, date, &self.tz))
    }
}
