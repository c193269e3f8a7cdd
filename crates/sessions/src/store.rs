use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

use consult_common::{ChatMessage, now_ms};

use crate::snapshot;

/// Coalescing window for snapshot writes. Repeated mutations inside the
/// window collapse into a single write of the full current state.
const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Default idle window after which a session's history is reset.
pub const DEFAULT_EXPIRY_MINUTES: u64 = 30;

/// Per-sender conversation state.
///
/// `last_activity_timestamp` is monotonically non-decreasing across updates
/// for a given sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub sender_id: String,
    pub history: Vec<ChatMessage>,
    pub last_activity_timestamp: u64,
    pub turn_count: u32,
}

impl Session {
    fn new(sender_id: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            history: Vec::new(),
            last_activity_timestamp: now_ms(),
            turn_count: 0,
        }
    }
}

/// Counters returned by [`SessionStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Sessions currently held in memory.
    pub total: usize,
    /// Subset whose last activity is within the expiry window.
    pub active: usize,
}

struct Inner {
    sessions: Mutex<HashMap<String, Session>>,
    expiry: Duration,
    snapshot_path: Option<PathBuf>,
    save_task: Mutex<Option<JoinHandle<()>>>,
}

/// In-memory session store with idle expiry, periodic hard eviction, and
/// debounced snapshot persistence.
///
/// Cheap to clone; all clones share one map behind a single coarse lock.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Create a store, restoring unexpired sessions from the snapshot file.
    ///
    /// A missing or corrupt snapshot is not an error: the store starts
    /// empty and logs a warning. Records already past the expiry window are
    /// discarded so stale snapshots never resurrect expired sessions.
    #[must_use]
    pub fn new(expiry: Duration, snapshot_path: Option<PathBuf>) -> Self {
        let mut sessions = HashMap::new();
        if let Some(path) = snapshot_path.as_deref() {
            match snapshot::read(path) {
                Ok(records) => {
                    let now = now_ms();
                    let loaded = records.len();
                    for record in records {
                        if now.saturating_sub(record.last_activity_timestamp)
                            <= expiry.as_millis() as u64
                        {
                            sessions.insert(record.sender_id.clone(), record);
                        }
                    }
                    if loaded > 0 {
                        info!(
                            restored = sessions.len(),
                            loaded,
                            path = %path.display(),
                            "restored sessions from snapshot"
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load session snapshot, starting empty"
                    );
                },
            }
        }

        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(sessions),
                expiry,
                snapshot_path,
                save_task: Mutex::new(None),
            }),
        }
    }

    /// Return the sender's session, creating one on first contact.
    ///
    /// When the idle window has elapsed the history and turn count are reset
    /// in place and the activity timestamp moves to now; the session object
    /// itself is never removed here. Within the window the session is
    /// returned unmodified, timestamp included.
    pub fn get_or_create(&self, sender_id: &str) -> Session {
        let mut sessions = self.lock_sessions();
        let now = now_ms();
        match sessions.get_mut(sender_id) {
            Some(session) => {
                let idle = now.saturating_sub(session.last_activity_timestamp);
                if idle > self.inner.expiry.as_millis() as u64 {
                    info!(
                        sender_id,
                        idle_minutes = idle / 60_000,
                        "session expired, resetting history"
                    );
                    session.history.clear();
                    session.turn_count = 0;
                    session.last_activity_timestamp = now;
                }
                session.clone()
            },
            None => {
                info!(sender_id, "new session created");
                let session = Session::new(sender_id);
                sessions.insert(sender_id.to_string(), session.clone());
                session
            },
        }
    }

    /// Replace a session's history after a successful backend round-trip.
    ///
    /// The backend is authoritative for the final history, so the whole
    /// returned sequence is stored, not just the appended reply. Schedules a
    /// coalesced snapshot write without waiting for it.
    pub fn update(&self, sender_id: &str, new_history: Vec<ChatMessage>) {
        {
            let mut sessions = self.lock_sessions();
            let Some(session) = sessions.get_mut(sender_id) else {
                warn!(sender_id, "update for unknown session, ignoring");
                return;
            };
            session.history = new_history;
            session.last_activity_timestamp = now_ms().max(session.last_activity_timestamp);
            session.turn_count += 1;
        }
        self.schedule_save();
    }

    /// Evict sessions idle beyond the expiry window. Unlike the soft reset
    /// in [`get_or_create`], eviction removes the entry entirely to bound
    /// memory. Returns the number removed.
    ///
    /// [`get_or_create`]: SessionStore::get_or_create
    pub fn sweep(&self) -> usize {
        let removed = {
            let mut sessions = self.lock_sessions();
            let before = sessions.len();
            let now = now_ms();
            let expiry_ms = self.inner.expiry.as_millis() as u64;
            sessions.retain(|_, s| now.saturating_sub(s.last_activity_timestamp) <= expiry_ms);
            before - sessions.len()
        };
        if removed > 0 {
            info!(removed, "evicted expired sessions");
            self.schedule_save();
        }
        removed
    }

    /// Read-only counters; never mutates.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let sessions = self.lock_sessions();
        let now = now_ms();
        let expiry_ms = self.inner.expiry.as_millis() as u64;
        let active = sessions
            .values()
            .filter(|s| now.saturating_sub(s.last_activity_timestamp) <= expiry_ms)
            .count();
        StoreStats {
            total: sessions.len(),
            active,
        }
    }

    /// Write the snapshot immediately, cancelling any pending debounced
    /// write. Used at shutdown so the coalescing window cannot drop the
    /// final state.
    pub fn flush(&self) {
        let pending = {
            let mut slot = self
                .inner
                .save_task
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(task) = pending {
            task.abort();
        }
        persist(&self.inner);
    }

    /// Schedule a coalesced snapshot write. A newer mutation re-arms the
    /// timer, so only the last state inside the window is written.
    fn schedule_save(&self) {
        if self.inner.snapshot_path.is_none() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            let _ = tokio::task::spawn_blocking(move || persist(&inner)).await;
        });
        let mut slot = self
            .inner
            .save_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn set_last_activity(&self, sender_id: &str, timestamp: u64) {
        if let Some(session) = self.lock_sessions().get_mut(sender_id) {
            session.last_activity_timestamp = timestamp;
        }
    }
}

fn persist(inner: &Inner) {
    let Some(path) = inner.snapshot_path.as_deref() else {
        return;
    };
    let records: Vec<Session> = {
        let sessions = inner.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.values().cloned().collect()
    };
    match snapshot::write(path, &records) {
        Ok(()) => debug!(count = records.len(), "session snapshot written"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to persist sessions"),
    }
}
