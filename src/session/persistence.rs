//! File-backed session records for crash recovery.
//!
//! One JSON object keyed by meeting id, rewritten whole on every change.
//! Only session creation and finalization touch it. Per-tick state
//! (frame counts, transcript) is deliberately not persisted; the frames
//! on disk are the source of truth a recovery can rebuild from.

use crate::platform::Platform;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ACTIVE_SESSIONS_FILE: &str = "active_sessions.json";

/// The recoverable subset of a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub meeting_id: String,
    pub session_id: String,
    pub platform: Platform,
    pub frames_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub frame_count: u64,
}

/// Whole-file store for [`PersistedSession`] records. Callers serialize
/// access through the registry lock; the store itself does plain
/// read-modify-write.
pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(recordings_root: &Path) -> Self {
        Self {
            path: recordings_root.join(ACTIVE_SESSIONS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<HashMap<String, PersistedSession>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", self.path))
    }

    pub fn get(&self, meeting_id: &str) -> Result<Option<PersistedSession>> {
        Ok(self.load()?.remove(meeting_id))
    }

    pub fn insert(&self, record: PersistedSession) -> Result<()> {
        let mut sessions = self.load().unwrap_or_default();
        sessions.insert(record.meeting_id.clone(), record);
        self.write(&sessions)
    }

    pub fn remove(&self, meeting_id: &str) -> Result<()> {
        let mut sessions = self.load().unwrap_or_default();
        if sessions.remove(meeting_id).is_some() {
            self.write(&sessions)?;
        }
        Ok(())
    }

    fn write(&self, sessions: &HashMap<String, PersistedSession>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let content =
            serde_json::to_string_pretty(sessions).context("Failed to serialize sessions")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(meeting_id: &str) -> PersistedSession {
        PersistedSession {
            meeting_id: meeting_id.to_string(),
            session_id: format!("sid-{meeting_id}"),
            platform: Platform::GoogleMeet,
            frames_dir: PathBuf::from("/tmp/frames"),
            started_at: Utc::now(),
            frame_count: 0,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::new(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_insert_get_remove_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::new(dir.path());

        store.insert(record("M1")).unwrap();
        store.insert(record("M2")).unwrap();

        let got = store.get("M1").unwrap().unwrap();
        assert_eq!(got.session_id, "sid-M1");
        assert_eq!(got.platform, Platform::GoogleMeet);

        store.remove("M1").unwrap();
        assert!(store.get("M1").unwrap().is_none());
        assert!(store.get("M2").unwrap().is_some());
    }

    #[test]
    fn test_remove_absent_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.remove("nope").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_started_at_serializes_as_iso8601() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::new(dir.path());
        let mut rec = record("M1");
        rec.started_at = "2024-01-01T00:00:00Z".parse().unwrap();
        store.insert(rec).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("2024-01-01T00:00:00Z"));
    }
}
