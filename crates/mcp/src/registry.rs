//! Process-wide inventory of live sessions.
//!
//! Sessions are never shared; the registry only records what is running so
//! an operator (or a shutdown path) can see it. Entries are removed when the
//! [`Registration`] guard held by the session is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the registry knows about one session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: SessionId,
    pub executable: PathBuf,
    pub pid: Option<u32>,
    pub started_at: SystemTime,
}

/// Shared inventory of live sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session. The entry lives as long as the returned guard.
    pub fn insert(&self, entry: SessionEntry) -> Registration {
        let id = entry.id;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
        Registration {
            id,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Snapshot of all live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<SessionEntry> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.started_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its session from the registry on drop.
#[derive(Debug)]
pub struct Registration {
    id: SessionId,
    entries: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl Registration {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
