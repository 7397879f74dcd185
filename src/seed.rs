//! First-run sample history
//!
//! New users get a month of plausible nights so the sleep screen has
//! something to show. Seeding happens at most once per user: the seeded
//! marker is kept even after the user deletes the sample sessions.

use crate::error::SleepError;
use crate::store::{KeyValueStore, SleepRepository};
use crate::types::SleepSession;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

/// Number of nights generated for a new user
pub const SEED_NIGHTS: u32 = 30;

const START_MINUTES: [u32; 4] = [0, 15, 30, 45];

/// Generate one night per day for the `nights` days before `today`, newest first.
///
/// Bedtime is 22:xx, or 21:xx three times in ten, on a quarter hour; sleep
/// lasts between 6.5 and 8.5 hours.
pub fn synthetic_history<Tz, R>(
    today: NaiveDate,
    tz: &Tz,
    nights: u32,
    rng: &mut R,
) -> Vec<SleepSession>
where
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    (1..=nights)
        .filter_map(|days_back| {
            let day = today - Duration::days(i64::from(days_back));
            let hour = if rng.gen_bool(0.3) { 21 } else { 22 };
            let minute = *START_MINUTES.choose(&mut *rng)?;
            let duration = Duration::minutes(rng.gen_range(390..=510));

            let start = tz
                .from_local_datetime(&day.and_hms_opt(hour, minute, 0)?)
                .earliest()?
                .with_timezone(&Utc);

            Some(SleepSession {
                id: Uuid::new_v4().to_string(),
                start,
                end: start + duration,
                stage: Some("asleep".to_string()),
            })
        })
        .collect()
}

/// Seed a user with sample history unless they have data or were seeded before.
///
/// Returns whether anything was written.
pub fn seed_if_empty<S, Tz, R>(
    repository: &SleepRepository<S>,
    today: NaiveDate,
    tz: &Tz,
    rng: &mut R,
) -> Result<bool, SleepError>
where
    S: KeyValueStore,
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    if repository.is_seeded()? || !repository.load_sessions()?.is_empty() {
        return Ok(false);
    }

    let sessions = synthetic_history(today, tz, SEED_NIGHTS, rng);
    repository.save_sessions(&sessions)?;
    repository.mark_seeded()?;

    info!(
        user = repository.user_id(),
        nights = sessions.len(),
        "seeded sample sleep history"
    );
    Ok(true)
}
