//! Process-wide table of live sessions.

use super::persistence::PersistenceStore;
use super::SessionHandle;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Concurrent `meeting_id → session` map plus the persistence file that
/// mirrors it. All mutation happens under one mutex, which also
/// serializes rewrites of `active_sessions.json` (single-writer
/// discipline). Iteration is deliberately not exposed.
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, Arc<SessionHandle>>>,
    store: PersistenceStore,
}

impl SessionRegistry {
    pub fn new(store: PersistenceStore) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            store,
        }
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    /// Register a new session and persist its recovery record. Returns
    /// `false` (and leaves the registry untouched) when the meeting
    /// already has a live session.
    pub async fn insert_unique(&self, handle: Arc<SessionHandle>) -> Result<bool> {
        let mut sessions = self.inner.lock().await;
        let session = handle.snapshot().await;

        if sessions.contains_key(&session.meeting_id) {
            return Ok(false);
        }

        self.store.insert(session.persisted())?;
        sessions.insert(session.meeting_id.clone(), handle);
        Ok(true)
    }

    pub async fn get(&self, meeting_id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.lock().await.get(meeting_id).cloned()
    }

    /// Drop a session from the registry and the persistence file. The
    /// removal is the last observable effect of a finalized session.
    pub async fn remove(&self, meeting_id: &str) -> Option<Arc<SessionHandle>> {
        let mut sessions = self.inner.lock().await;
        let handle = sessions.remove(meeting_id);
        if let Err(e) = self.store.remove(meeting_id) {
            warn!("Failed to clear persistence for {}: {}", meeting_id, e);
        }
        handle
    }

    /// Remove only the persisted record (recovery path, where no live
    /// handle exists).
    pub async fn clear_persisted(&self, meeting_id: &str) -> Result<()> {
        let _guard = self.inner.lock().await;
        self.store.remove(meeting_id)
    }

    /// Drain every live handle for shutdown.
    pub async fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions = self.inner.lock().await;
        sessions.drain().map(|(_, handle)| handle).collect()
    }
}
