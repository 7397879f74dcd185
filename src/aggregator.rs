//! Sleep aggregation
//!
//! Turns a flat list of sleep sessions into per-day totals and the weekly,
//! monthly and display averages shown on the sleep screen. Sessions that cross
//! midnight are split so that each local calendar date gets exactly the hours
//! slept on it.
//!
//! Everything here is a pure function of its inputs: no I/O, no caching.

use crate::calendar::{group_by_weeks, next_local_midnight};
use crate::types::{DayBreakdown, DayTotals, SleepSession, WeekSummary};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::debug;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Split one session into the hours it contributes to each local date.
///
/// Sessions whose end is not after their start contribute nothing. The sum of
/// the returned hours equals the session duration, and the loop runs once per
/// calendar day the session touches.
pub fn split_across_midnight<Tz: TimeZone>(session: &SleepSession, tz: &Tz) -> DayTotals {
    let mut slices = DayTotals::new();

    if !session.is_valid() {
        debug!(
            session_id = %session.id,
            start = %session.start,
            end = %session.end,
            "skipping sleep session with non-positive duration"
        );
        return slices;
    }

    let mut cursor = session.start;
    while cursor < session.end {
        let local = cursor.with_timezone(tz);
        let slice_end = match next_local_midnight(&local) {
            Some(boundary) => boundary.min(session.end),
            None => session.end,
        };

        *slices.entry(local.date_naive()).or_insert(0.0) += hours_between(cursor, slice_end);
        cursor = slice_end;
    }

    slices
}

/// Total sleep hours per local date across all sessions.
///
/// Accumulation is additive, so session order does not matter.
pub fn aggregate_by_day<Tz: TimeZone>(sessions: &[SleepSession], tz: &Tz) -> DayTotals {
    let mut totals = DayTotals::new();

    for session in sessions {
        for (day, hours) in split_across_midnight(session, tz) {
            *totals.entry(day).or_insert(0.0) += hours;
        }
    }

    totals
}

/// Hours recorded for `date`, zero when nothing was logged
pub fn day_total(day_totals: &DayTotals, date: &NaiveDate) -> f64 {
    day_totals.get(date).copied().unwrap_or(0.0)
}

/// Per-week summaries for a month's dates, weeks ending on Sunday.
///
/// Each week is averaged over the number of its days that fall in the
/// month, so short first and last weeks are not padded to seven.
pub fn weekly_summaries(month_days: &[NaiveDate], day_totals: &DayTotals) -> Vec<WeekSummary> {
    group_by_weeks(month_days)
        .into_iter()
        .filter_map(|week| {
            let (first_day, last_day) = (*week.first()?, *week.last()?);
            let total: f64 = week.iter().map(|d| day_total(day_totals, d)).sum();

            Some(WeekSummary {
                first_day,
                last_day,
                days: week.len(),
                average_hours: total / week.len() as f64,
            })
        })
        .collect()
}

/// Average sleep hours for each Sunday-terminated week of the month
pub fn weekly_averages(month_days: &[NaiveDate], day_totals: &DayTotals) -> Vec<f64> {
    weekly_summaries(month_days, day_totals)
        .into_iter()
        .map(|week| week.average_hours)
        .collect()
}

/// Last non-zero value in the series, scanning from the end
pub fn latest_non_zero(series: &[f64]) -> Option<f64> {
    series.iter().rev().copied().find(|v| *v > 0.0)
}

/// Average sleep hours per day across the whole month
pub fn monthly_average(month_days: &[NaiveDate], day_totals: &DayTotals) -> f64 {
    if month_days.is_empty() {
        return 0.0;
    }
    let total: f64 = month_days.iter().map(|d| day_total(day_totals, d)).sum();
    total / month_days.len() as f64
}

/// Representative "current" average: the latest week with data, else the month
pub fn display_average(weekly: &[f64], monthly: f64) -> f64 {
    latest_non_zero(weekly).unwrap_or(monthly)
}

/// Sessions that start or end on the given local date, in input order
pub fn sessions_for_day<Tz: TimeZone>(
    sessions: &[SleepSession],
    date: NaiveDate,
    tz: &Tz,
) -> Vec<SleepSession> {
    sessions
        .iter()
        .filter(|s| {
            s.start.with_timezone(tz).date_naive() == date
                || s.end.with_timezone(tz).date_naive() == date
        })
        .cloned()
        .collect()
}

/// Detail for one date: its total and the sessions that touch it
pub fn day_breakdown<Tz: TimeZone>(
    sessions: &[SleepSession],
    day_totals: &DayTotals,
    date: NaiveDate,
    tz: &Tz,
) -> DayBreakdown {
    let total_hours = day_total(day_totals, &date);

    DayBreakdown {
        date,
        total_hours,
        total_minutes: (total_hours * 60.0).round() as u32,
        sessions: sessions_for_day(sessions, date, tz),
    }
}

/// Rounded sleep minutes for each date of a chart window
pub fn week_totals_minutes(week: &[NaiveDate], day_totals: &DayTotals) -> Vec<u32> {
    week.iter()
        .map(|d| (day_total(day_totals, d) * 60.0).round() as u32)
        .collect()
}
