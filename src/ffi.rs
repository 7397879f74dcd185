//! FFI bindings for HealthBuddy sleep
//!
//! C-compatible functions that let the mobile app call the aggregation and
//! analysis stages directly. Inputs and outputs are JSON in null-terminated C
//! strings; returned strings are allocated here and must be released with
//! `hbsleep_free_string`.
//!
//! Time zones cross the boundary as a UTC offset in minutes east of UTC.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::aggregator::{aggregate_by_day, weekly_averages};
use crate::calendar::{month_days, offset_from_minutes};
use crate::error::SleepError;
use crate::schedule::{analyze_schedule, recommendations};
use crate::types::{DayTotals, ScheduleAnalysis, SleepSchedule, SleepSession};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a result back across the boundary, recording the error on failure
fn finish(result: Result<String, SleepError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Analysis plus recommendations, as returned to the app
#[derive(Debug, Serialize)]
struct ScheduleResponse {
    analysis: Option<ScheduleAnalysis>,
    recommendations: Vec<String>,
}

fn aggregate_json(sessions_json: &str, utc_offset_minutes: i32) -> Result<String, SleepError> {
    let tz = offset_from_minutes(utc_offset_minutes)?;
    let sessions: Vec<SleepSession> = serde_json::from_str(sessions_json)?;
    Ok(serde_json::to_string(&aggregate_by_day(&sessions, &tz))?)
}

fn analyze_json(
    sessions_json: &str,
    schedule_json: &str,
    utc_offset_minutes: i32,
) -> Result<String, SleepError> {
    let tz = offset_from_minutes(utc_offset_minutes)?;
    let sessions: Vec<SleepSession> = serde_json::from_str(sessions_json)?;
    let schedule: SleepSchedule = serde_json::from_str(schedule_json)?;

    let analysis = analyze_schedule(&sessions, &schedule, &tz);
    let response = ScheduleResponse {
        recommendations: recommendations(analysis.as_ref()),
        analysis,
    };
    Ok(serde_json::to_string(&response)?)
}

fn weekly_json(year: i32, month: u32, day_totals_json: &str) -> Result<String, SleepError> {
    let days = month_days(year, month)?;
    let totals: DayTotals = serde_json::from_str(day_totals_json)?;
    Ok(serde_json::to_string(&weekly_averages(&days, &totals))?)
}

// ============================================================================
// Aggregation API
// ============================================================================

/// Aggregate sessions into per-day sleep hours.
///
/// Returns a JSON object mapping `YYYY-MM-DD` to hours.
///
/// # Safety
/// - `sessions_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hbsleep_free_string`.
/// - Returns NULL on error; call `hbsleep_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_aggregate_by_day(
    sessions_json: *const c_char,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let Some(sessions) = cstr_to_str(sessions_json) else {
        set_last_error("Invalid sessions string pointer");
        return ptr::null_mut();
    };

    finish(aggregate_json(sessions, utc_offset_minutes))
}

/// Compute weekly averages for a month from a day-totals JSON object.
///
/// # Safety
/// - `day_totals_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hbsleep_free_string`.
/// - Returns NULL on error; call `hbsleep_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_weekly_averages(
    year: i32,
    month: u32,
    day_totals_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(totals) = cstr_to_str(day_totals_json) else {
        set_last_error("Invalid day totals string pointer");
        return ptr::null_mut();
    };

    finish(weekly_json(year, month, totals))
}

// ============================================================================
// Schedule API
// ============================================================================

/// Analyze schedule consistency and build recommendations.
///
/// Returns `{"analysis": {...} | null, "recommendations": [...]}`.
///
/// # Safety
/// - `sessions_json` and `schedule_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hbsleep_free_string`.
/// - Returns NULL on error; call `hbsleep_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_analyze_schedule(
    sessions_json: *const c_char,
    schedule_json: *const c_char,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let Some(sessions) = cstr_to_str(sessions_json) else {
        set_last_error("Invalid sessions string pointer");
        return ptr::null_mut();
    };
    let Some(schedule) = cstr_to_str(schedule_json) else {
        set_last_error("Invalid schedule string pointer");
        return ptr::null_mut();
    };

    finish(analyze_json(sessions, schedule, utc_offset_minutes))
}

// ============================================================================
// Memory and diagnostics
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a pointer returned by one of the `hbsleep_*` functions, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message for the calling thread.
///
/// # Safety
/// - Returns a pointer owned by the library; do not free it.
/// - The pointer is valid until the next `hbsleep_*` call on this thread.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a static string; do not free it.
#[no_mangle]
pub unsafe extern "C" fn hbsleep_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sessions_json() -> CString {
        CString::new(
            r#"[
                {"id": "a", "startISO": "2024-01-15T23:00:00Z", "endISO": "2024-01-16T06:30:00Z", "stage": "asleep"},
                {"id": "b", "startISO": "2024-01-16T22:30:00Z", "endISO": "2024-01-17T07:00:00Z"}
            ]"#,
        )
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null(), "unexpected NULL result");
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        hbsleep_free_string(ptr);
        s
    }

    unsafe fn last_error() -> String {
        let err = hbsleep_last_error();
        assert!(!err.is_null());
        CStr::from_ptr(err).to_str().unwrap().to_string()
    }

    #[test]
    fn test_ffi_aggregate_by_day() {
        unsafe {
            let sessions = sample_sessions_json();
            let result = take_string(hbsleep_aggregate_by_day(sessions.as_ptr(), 0));

            let totals: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(totals["2024-01-15"], 1.0);
            assert_eq!(totals["2024-01-16"], 8.0);
            assert_eq!(totals["2024-01-17"], 7.0);
            assert!(hbsleep_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_aggregate_with_offset() {
        unsafe {
            let sessions = sample_sessions_json();
            // UTC+2: the first night runs 01:00 -> 08:30 on the 16th
            let result = take_string(hbsleep_aggregate_by_day(sessions.as_ptr(), 120));

            let totals: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert!(totals.get("2024-01-15").is_none());
            assert_eq!(totals["2024-01-16"], 7.5);
        }
    }

    #[test]
    fn test_ffi_analyze_schedule() {
        unsafe {
            let sessions = sample_sessions_json();
            let schedule = CString::new(r#"{"bedtime": "22:30", "wakeTime": "07:00"}"#).unwrap();
            let result = take_string(hbsleep_analyze_schedule(
                sessions.as_ptr(),
                schedule.as_ptr(),
                0,
            ));

            let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(payload["analysis"]["sessions_considered"], 2);
            // Bedtime off by 30 and 0, wake off by 30 and 0: 15 + 15 -> 85
            assert_eq!(payload["analysis"]["consistency_score"], 85);
            assert!(payload["recommendations"].is_array());
        }
    }

    #[test]
    fn test_ffi_analyze_empty_history() {
        unsafe {
            let sessions = CString::new("[]").unwrap();
            let schedule = CString::new(r#"{"bedtime": "22:30", "wakeTime": "07:00"}"#).unwrap();
            let result = take_string(hbsleep_analyze_schedule(
                sessions.as_ptr(),
                schedule.as_ptr(),
                0,
            ));

            let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert!(payload["analysis"].is_null());
            assert_eq!(payload["recommendations"], serde_json::json!([]));
        }
    }

    #[test]
    fn test_ffi_weekly_averages() {
        unsafe {
            let totals = CString::new(r#"{"2024-09-01": 8.0, "2024-09-30": 6.0}"#).unwrap();
            let result = take_string(hbsleep_weekly_averages(2024, 9, totals.as_ptr()));

            let weeks: Vec<f64> = serde_json::from_str(&result).unwrap();
            assert_eq!(weeks, vec![8.0, 0.0, 0.0, 0.0, 0.0, 6.0]);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let result = hbsleep_aggregate_by_day(ptr::null(), 0);
            assert!(result.is_null());
            assert!(last_error().contains("Invalid sessions"));

            let garbage = CString::new("not valid json").unwrap();
            assert!(hbsleep_aggregate_by_day(garbage.as_ptr(), 0).is_null());
            assert!(last_error().contains("Invalid JSON"));

            let sessions = sample_sessions_json();
            let bad_schedule =
                CString::new(r#"{"bedtime": "25:00", "wakeTime": "07:00"}"#).unwrap();
            let result =
                hbsleep_analyze_schedule(sessions.as_ptr(), bad_schedule.as_ptr(), 0);
            assert!(result.is_null());
            assert!(last_error().contains("HH:MM"));

            assert!(hbsleep_aggregate_by_day(sessions.as_ptr(), i32::MAX).is_null());
            assert!(last_error().contains("Invalid timezone"));

            let totals = CString::new("{}").unwrap();
            assert!(hbsleep_weekly_averages(2024, 13, totals.as_ptr()).is_null());
            assert!(last_error().contains("Invalid month"));
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(hbsleep_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        }
    }
}
