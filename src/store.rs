//! Per-user persistence
//!
//! Sleep data is kept in a string key-value store, one JSON document per key,
//! namespaced by user id. The store is an injected capability: callers choose
//! [`FileStore`] for on-device persistence or [`MemoryStore`] in tests.
//! [`SleepRepository`] sits on top and validates records as they cross the
//! storage boundary.

use crate::error::SleepError;
use crate::types::{SchedulePatch, SleepSchedule, SleepSession};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage key for the session list
pub const SESSIONS_KEY: &str = "sleep.sessions.v1";
/// Storage key for the sleep schedule
pub const SCHEDULE_KEY: &str = "sleep.schedule.v1";
/// Storage key for the first-run seeding marker
pub const SEEDED_KEY: &str = "sleep.seeded.v1";

/// Trait for string key-value backends
pub trait KeyValueStore {
    /// Read a value, `None` when the key was never written
    fn get_item(&self, key: &str) -> Result<Option<String>, SleepError>;

    /// Write a value, replacing any previous one
    fn set_item(&self, key: &str, value: &str) -> Result<(), SleepError>;

    /// Delete a value; deleting a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<(), SleepError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get_item(&self, key: &str) -> Result<Option<String>, SleepError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SleepError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), SleepError> {
        (**self).remove_item(key)
    }
}

/// In-memory store, shareable by reference
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, SleepError> {
        Ok(self.items.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SleepError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<E>(_: E) -> SleepError {
    SleepError::StorageError("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, SleepError> {
        Ok(self.items.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SleepError> {
        self.items
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), SleepError> {
        self.items.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Directory-backed store: each key is one file under the root.
///
/// `/` in a key separates directories. Each segment is percent-encoded, so
/// distinct keys always map to distinct files and no key can escape the root.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(encode_segment(segment));
        }
        path
    }
}

/// Encode one key segment as a file name.
///
/// Everything outside `[A-Za-z0-9._~-]` is percent-encoded. The dot-only
/// names `.` and `..` and the empty segment get encodings that `encode`
/// itself never produces.
fn encode_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }
    if segment.bytes().all(|b| b == b'.') {
        return "%2E".repeat(segment.len());
    }
    urlencoding::encode(segment).into_owned()
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, SleepError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SleepError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a half-written document
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), SleepError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Sleep sessions and schedule for a single user
#[derive(Debug)]
pub struct SleepRepository<S: KeyValueStore> {
    store: S,
    user_id: String,
}

impl<S: KeyValueStore> SleepRepository<S> {
    pub fn new(store: S, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Storage key for one of this user's documents.
    ///
    /// The user id is encoded so a `/` inside it cannot reach into another
    /// user's namespace.
    fn key(&self, name: &str) -> String {
        format!("{}/{}", urlencoding::encode(&self.user_id), name)
    }

    /// Load the session list, most recent first.
    ///
    /// Records that fail to deserialize or have a non-positive duration are
    /// dropped with a warning rather than failing the whole load.
    pub fn load_sessions(&self) -> Result<Vec<SleepSession>, SleepError> {
        let Some(raw) = self.store.get_item(&self.key(SESSIONS_KEY))? else {
            return Ok(Vec::new());
        };

        let records: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        let total = records.len();

        let sessions: Vec<SleepSession> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                match serde_json::from_value::<SleepSession>(record) {
                    Ok(session) if session.is_valid() => Some(session),
                    Ok(session) => {
                        warn!(
                            user = %self.user_id,
                            session_id = %session.id,
                            "dropping session with non-positive duration"
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            user = %self.user_id,
                            index,
                            error = %e,
                            "dropping malformed session record"
                        );
                        None
                    }
                }
            })
            .collect();

        debug!(user = %self.user_id, loaded = sessions.len(), total, "loaded sleep sessions");
        Ok(sessions)
    }

    /// Replace the stored session list
    pub fn save_sessions(&self, sessions: &[SleepSession]) -> Result<(), SleepError> {
        let json = serde_json::to_string(sessions)?;
        self.store.set_item(&self.key(SESSIONS_KEY), &json)?;
        debug!(user = %self.user_id, count = sessions.len(), "saved sleep sessions");
        Ok(())
    }

    /// Validate and store a new session, keeping the list newest-first
    pub fn add_session(&self, session: SleepSession) -> Result<(), SleepError> {
        session.validate()?;

        let mut sessions = self.load_sessions()?;
        let position = sessions
            .iter()
            .position(|s| s.start <= session.start)
            .unwrap_or(sessions.len());
        sessions.insert(position, session);

        self.save_sessions(&sessions)
    }

    /// Load the schedule, falling back to the default when none is stored
    pub fn load_schedule(&self) -> Result<SleepSchedule, SleepError> {
        match self.store.get_item(&self.key(SCHEDULE_KEY))? {
            Some(raw) => parse_schedule(&raw),
            None => Ok(SleepSchedule::default()),
        }
    }

    /// Merge a partial edit into the stored schedule and persist the result
    pub fn save_schedule(&self, patch: &SchedulePatch) -> Result<SleepSchedule, SleepError> {
        let merged = self.load_schedule()?.apply(patch);
        let json = serde_json::to_string(&merged)?;
        self.store.set_item(&self.key(SCHEDULE_KEY), &json)?;
        debug!(
            user = %self.user_id,
            bedtime = %merged.bedtime,
            wake_time = %merged.wake_time,
            "saved sleep schedule"
        );
        Ok(merged)
    }

    pub fn is_seeded(&self) -> Result<bool, SleepError> {
        Ok(self.store.get_item(&self.key(SEEDED_KEY))?.is_some())
    }

    pub fn mark_seeded(&self) -> Result<(), SleepError> {
        self.store.set_item(&self.key(SEEDED_KEY), "1")
    }

    /// Remove every sleep record for this user
    pub fn reset(&self) -> Result<(), SleepError> {
        for name in [SESSIONS_KEY, SCHEDULE_KEY, SEEDED_KEY] {
            self.store.remove_item(&self.key(name))?;
        }
        info!(user = %self.user_id, "reset sleep data");
        Ok(())
    }
}

/// Parse a stored schedule, reporting bad time strings as format errors
fn parse_schedule(raw: &str) -> Result<SleepSchedule, SleepError> {
    serde_json::from_str(raw).map_err(|e| {
        if e.is_data() {
            SleepError::InvalidScheduleFormat(e.to_string())
        } else {
            SleepError::JsonError(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn night(day: u32) -> SleepSession {
        SleepSession {
            id: format!("night-{day}"),
            start: Utc.with_ymd_and_hms(2024, 1, day, 22, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, day + 1, 6, 45, 0).unwrap(),
            stage: Some("asleep".to_string()),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_item("a").unwrap(), None);

        store.set_item("a", "1").unwrap();
        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("1"));

        store.remove_item("a").unwrap();
        store.remove_item("a").unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert_eq!(store.get_item("alice/sleep.sessions.v1").unwrap(), None);
        store.set_item("alice/sleep.sessions.v1", "[]").unwrap();
        assert_eq!(
            store.get_item("alice/sleep.sessions.v1").unwrap().as_deref(),
            Some("[]")
        );
        assert!(dir.path().join("alice").join("sleep.sessions.v1").exists());

        store.remove_item("alice/sleep.sessions.v1").unwrap();
        store.remove_item("alice/sleep.sessions.v1").unwrap();
        assert_eq!(store.get_item("alice/sleep.sessions.v1").unwrap(), None);
    }

    #[test]
    fn test_file_store_keys_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let path = store.path_for("../../etc/passwd");
        assert!(path.starts_with(dir.path()));
        assert_eq!(encode_segment(".."), "%2E%2E");
        assert_eq!(encode_segment("."), "%2E");
        assert_eq!(encode_segment(""), "%");
        assert_eq!(encode_segment("sleep.sessions.v1"), "sleep.sessions.v1");
        assert_eq!(encode_segment("user@example.com"), "user%40example.com");
        assert_ne!(encode_segment("%2E"), encode_segment("."));
    }

    #[test]
    fn test_file_store_keeps_similar_users_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let ann = SleepRepository::new(&store, "ann@x.com");
        let lookalike = SleepRepository::new(&store, "ann_x.com");

        ann.add_session(night(1)).unwrap();
        ann.mark_seeded().unwrap();
        assert!(lookalike.load_sessions().unwrap().is_empty());
        assert!(!lookalike.is_seeded().unwrap());

        lookalike.add_session(night(2)).unwrap();
        lookalike.reset().unwrap();
        let ids: Vec<String> = ann.load_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["night-1"]);
        assert!(ann.is_seeded().unwrap());
    }

    #[test]
    fn test_slash_in_user_id_stays_in_own_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let parent = SleepRepository::new(&store, "team");
        let nested = SleepRepository::new(&store, "team/ann");

        parent.add_session(night(1)).unwrap();
        nested.add_session(night(2)).unwrap();
        assert!(dir.path().join("team%252Fann").is_dir());

        nested.reset().unwrap();
        assert_eq!(parent.load_sessions().unwrap().len(), 1);
        assert!(nested.load_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_namespaced_by_user() {
        let store = MemoryStore::new();
        let alice = SleepRepository::new(&store, "alice");
        let bob = SleepRepository::new(&store, "bob");

        alice.add_session(night(1)).unwrap();
        assert_eq!(alice.load_sessions().unwrap().len(), 1);
        assert!(bob.load_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_add_session_keeps_newest_first() {
        let store = MemoryStore::new();
        let repo = SleepRepository::new(&store, "alice");

        repo.add_session(night(3)).unwrap();
        repo.add_session(night(1)).unwrap();
        repo.add_session(night(5)).unwrap();
        repo.add_session(night(2)).unwrap();

        let ids: Vec<String> = repo.load_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["night-5", "night-3", "night-2", "night-1"]);
    }

    #[test]
    fn test_add_session_rejects_invalid() {
        let store = MemoryStore::new();
        let repo = SleepRepository::new(&store, "alice");

        let mut bad = night(1);
        bad.end = bad.start;
        assert!(matches!(
            repo.add_session(bad),
            Err(SleepError::InvalidSession { .. })
        ));
        assert!(repo.load_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_load_skips_bad_records() {
        let store = MemoryStore::new();
        let raw = r#"[
            {"id": "ok", "startISO": "2024-01-15T22:30:00Z", "endISO": "2024-01-16T06:30:00Z"},
            {"id": "backwards", "startISO": "2024-01-16T06:30:00Z", "endISO": "2024-01-15T22:30:00Z"},
            {"id": "garbled", "startISO": "yesterday"}
        ]"#;
        store.set_item("alice/sleep.sessions.v1", raw).unwrap();

        let repo = SleepRepository::new(&store, "alice");
        let sessions = repo.load_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "ok");
    }

    #[test]
    fn test_schedule_default_and_merge() {
        let store = MemoryStore::new();
        let repo = SleepRepository::new(&store, "alice");
        assert_eq!(repo.load_schedule().unwrap(), SleepSchedule::default());

        let patch = SchedulePatch {
            bedtime: Some("23:15".parse().unwrap()),
            ..Default::default()
        };
        let merged = repo.save_schedule(&patch).unwrap();
        assert_eq!(merged.bedtime.to_string(), "23:15");
        assert_eq!(merged.wake_time.to_string(), "07:00");
        assert_eq!(repo.load_schedule().unwrap(), merged);
    }

    #[test]
    fn test_corrupt_schedule_is_format_error() {
        let store = MemoryStore::new();
        store
            .set_item(
                "alice/sleep.schedule.v1",
                r#"{"bedtime": "25:99", "wakeTime": "07:00"}"#,
            )
            .unwrap();

        let repo = SleepRepository::new(&store, "alice");
        assert!(matches!(
            repo.load_schedule(),
            Err(SleepError::InvalidScheduleFormat(_))
        ));

        store.set_item("alice/sleep.schedule.v1", "{not json").unwrap();
        assert!(matches!(repo.load_schedule(), Err(SleepError::JsonError(_))));
    }

    #[test]
    fn test_reset_clears_user_data() {
        let store = MemoryStore::new();
        let repo = SleepRepository::new(&store, "alice");
        let other = SleepRepository::new(&store, "bob");

        repo.add_session(night(1)).unwrap();
        repo.save_schedule(&SchedulePatch::default()).unwrap();
        repo.mark_seeded().unwrap();
        other.mark_seeded().unwrap();

        repo.reset().unwrap();
        assert!(repo.load_sessions().unwrap().is_empty());
        assert!(!repo.is_seeded().unwrap());
        assert!(other.is_seeded().unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }
}
