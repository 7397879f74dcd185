//! Calendar helpers
//!
//! Month and week layouts, local-midnight boundaries, UTC offset parsing and
//! the display formats used for sleep durations and clock times.

use crate::error::SleepError;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc, Weekday,
};

/// All dates of a month, in order
pub fn month_days(year: i32, month: u32) -> Result<Vec<NaiveDate>, SleepError> {
    let first =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(SleepError::InvalidMonth { year, month })?;
    Ok(first.iter_days().take_while(|d| d.month() == month).collect())
}

/// Move `delta` months forward (or backward) from the given month
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Split ordered dates into weeks that end on Sunday.
///
/// A trailing run that does not reach a Sunday is kept as a short week.
pub fn group_by_weeks(days: &[NaiveDate]) -> Vec<&[NaiveDate]> {
    days.split_inclusive(|d| d.weekday() == Weekday::Sun).collect()
}

/// Seven consecutive dates starting on the Sunday of `today`'s week,
/// shifted by `offset` weeks.
pub fn week_window(today: NaiveDate, offset: i32) -> Vec<NaiveDate> {
    let back = i64::from(today.weekday().num_days_from_sunday());
    let start = today - Duration::days(back) + Duration::weeks(i64::from(offset));
    start.iter_days().take(7).collect()
}

/// First instant of the local day after `instant`'s local day.
///
/// This is the exclusive end of the current day: strictly later than every
/// instant that shares its local date. When a DST gap swallows midnight the
/// first valid local hour after it is used. Returns `None` only past the end
/// of the representable calendar.
pub fn next_local_midnight<Tz: TimeZone>(instant: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let tz = instant.timezone();
    let midnight = instant.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;

    (0..=24)
        .find_map(|h| tz.from_local_datetime(&(midnight + Duration::hours(h))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Minutes elapsed since local midnight for `instant` in `tz`
pub fn minutes_of_day<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> u32 {
    let local = instant.with_timezone(tz);
    local.hour() * 60 + local.minute()
}

/// Build a fixed offset from minutes east of UTC
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, SleepError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| SleepError::InvalidTimezone(format!("{minutes} minutes")))
}

/// Parse a UTC offset such as `+02:00`, `-0530`, `+9`, `Z` or `UTC`
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, SleepError> {
    let invalid = || SleepError::InvalidTimezone(s.to_string());
    let trimmed = s.trim();

    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return offset_from_minutes(0);
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };

    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }

    offset_from_minutes(sign * (hours * 60 + minutes)).map_err(|_| invalid())
}

/// Format minutes since midnight as `H:MM`
pub fn format_clock_minutes(minutes: f64) -> String {
    let total = minutes.round().max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a duration in hours as `Xh MMm`
pub fn format_hours(hours: f64) -> String {
    let total = (hours * 60.0).round().max(0.0) as u64;
    format!("{}h {:02}m", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_days() {
        assert_eq!(month_days(2024, 2).unwrap().len(), 29);
        assert_eq!(month_days(2023, 2).unwrap().len(), 28);

        let days = month_days(2024, 12).unwrap();
        assert_eq!(days.first(), Some(&date(2024, 12, 1)));
        assert_eq!(days.last(), Some(&date(2024, 12, 31)));

        assert!(matches!(
            month_days(2024, 13),
            Err(SleepError::InvalidMonth { month: 13, .. })
        ));
    }

    #[test]
    fn test_shift_month() {
        assert_eq!(shift_month(2024, 1, -1), (2023, 12));
        assert_eq!(shift_month(2024, 12, 1), (2025, 1));
        assert_eq!(shift_month(2024, 6, 0), (2024, 6));
        assert_eq!(shift_month(2024, 3, -14), (2023, 1));
    }

    #[test]
    fn test_group_by_weeks_ends_on_sunday() {
        // September 2024 starts on a Sunday and ends on a Monday
        let days = month_days(2024, 9).unwrap();
        let weeks = group_by_weeks(&days);

        let lengths: Vec<usize> = weeks.iter().map(|w| w.len()).collect();
        assert_eq!(lengths, vec![1, 7, 7, 7, 7, 1]);
        assert_eq!(weeks[0][0], date(2024, 9, 1));
        assert_eq!(weeks[5][0], date(2024, 9, 30));
        assert!(group_by_weeks(&[]).is_empty());
    }

    #[test]
    fn test_week_window_starts_sunday() {
        // 2024-01-17 is a Wednesday
        let window = week_window(date(2024, 1, 17), 0);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0], date(2024, 1, 14));
        assert_eq!(window[6], date(2024, 1, 20));

        let previous = week_window(date(2024, 1, 17), -1);
        assert_eq!(previous[0], date(2024, 1, 7));

        // A Sunday anchors its own week
        assert_eq!(week_window(date(2024, 1, 14), 0)[0], date(2024, 1, 14));
    }

    #[test]
    fn test_next_local_midnight() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        assert_eq!(
            next_local_midnight(&instant),
            Some(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap())
        );

        // Exactly at midnight still belongs to that day
        let at_midnight = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();
        assert_eq!(
            next_local_midnight(&at_midnight),
            Some(Utc.with_ymd_and_hms(2024, 1, 17, 0, 0, 0).unwrap())
        );

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = instant.with_timezone(&plus_two); // 01:00 on the 16th
        assert_eq!(
            next_local_midnight(&local),
            Some(Utc.with_ymd_and_hms(2024, 1, 16, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_local_midnight_in_dst_gap() {
        use chrono_tz::America::Sao_Paulo;

        // Clocks jumped from 00:00 to 01:00 on 2018-11-04, so that day starts
        // at 01:00 local (-02:00)
        let evening = Sao_Paulo.with_ymd_and_hms(2018, 11, 3, 22, 0, 0).unwrap();
        assert_eq!(
            next_local_midnight(&evening),
            Some(Utc.with_ymd_and_hms(2018, 11, 4, 3, 0, 0).unwrap())
        );

        let morning = Sao_Paulo.with_ymd_and_hms(2018, 11, 4, 1, 30, 0).unwrap();
        assert_eq!(
            next_local_midnight(&morning),
            Some(Utc.with_ymd_and_hms(2018, 11, 5, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("+9").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);

        for bad in ["02:00", "+25:00", "+02:75", "America/New_York", ""] {
            assert!(parse_utc_offset(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_clock_minutes(22.0 * 60.0 + 45.0), "22:45");
        assert_eq!(format_clock_minutes(7.0 * 60.0 + 5.4), "7:05");
        assert_eq!(format_clock_minutes(59.6), "1:00");
        assert_eq!(format_hours(7.5), "7h 30m");
        assert_eq!(format_hours(0.0), "0h 00m");
    }
}
