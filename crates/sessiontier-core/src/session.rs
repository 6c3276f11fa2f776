//! Sessions held in local memory.
//!
//! A [`Session`] is shared as `Arc<Session>` between the request path and the
//! optimizer; its mutable state sits behind a lock. [`SessionData`] is the
//! serializable snapshot exchanged with remote storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Serializable state of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    /// Creation time, epoch ms
    pub created_ms: u64,
    /// Number of requests that touched the session
    pub requests: u64,
    /// Idle timeout; <= 0 never expires
    pub max_inactive_secs: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Catalogue entry of a remotely stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    /// Encoded size, bytes
    pub remote_size: u64,
}

#[derive(Debug)]
struct SessionState {
    attributes: BTreeMap<String, serde_json::Value>,
    accessed_ms: u64,
    requests: u64,
    max_inactive_secs: i64,
    valid: bool,
}

/// A live session.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_ms: u64,
    state: Mutex<SessionState>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, max_inactive_secs: i64) -> Self {
        Self::created_at(id, max_inactive_secs, epoch_ms())
    }

    /// A session created at an explicit time.
    #[must_use]
    pub fn created_at(id: impl Into<String>, max_inactive_secs: i64, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            created_ms: now_ms,
            state: Mutex::new(SessionState {
                attributes: BTreeMap::new(),
                accessed_ms: now_ms,
                requests: 0,
                max_inactive_secs,
                valid: true,
            }),
        }
    }

    /// Rebuild a session from storage. Restoring counts as an access.
    #[must_use]
    pub fn from_snapshot(data: SessionData) -> Self {
        Self {
            id: data.id,
            created_ms: data.created_ms,
            state: Mutex::new(SessionState {
                attributes: data.attributes,
                accessed_ms: epoch_ms(),
                requests: data.requests,
                max_inactive_secs: data.max_inactive_secs,
                valid: true,
            }),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        let state = self.state.lock();
        SessionData {
            id: self.id.clone(),
            created_ms: self.created_ms,
            requests: state.requests,
            max_inactive_secs: state.max_inactive_secs,
            attributes: state.attributes.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    #[must_use]
    pub fn accessed_ms(&self) -> u64 {
        self.state.lock().accessed_ms
    }

    #[must_use]
    pub fn requests(&self) -> u64 {
        self.state.lock().requests
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Record a request; returns false for an invalidated session.
    pub fn access(&self, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        if !state.valid {
            return false;
        }
        state.accessed_ms = state.accessed_ms.max(now_ms);
        state.requests += 1;
        true
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.valid = false;
        state.attributes.clear();
    }

    /// Idle longer than its timeout at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let state = self.state.lock();
        state.max_inactive_secs > 0
            && now_ms.saturating_sub(state.accessed_ms) > state.max_inactive_secs as u64 * 1000
    }

    #[must_use]
    pub fn max_inactive_secs(&self) -> i64 {
        self.state.lock().max_inactive_secs
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.state.lock().attributes.get(name).cloned()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: serde_json::Value) {
        self.state.lock().attributes.insert(name.into(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.state.lock().attributes.remove(name)
    }

    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.state.lock().attributes.keys().cloned().collect()
    }
}

/// Receives a notification whenever a session is touched.
pub trait SessionListener: Send + Sync {
    fn session_accessed(&self, id: &str);
}

/// Sessions currently resident in local memory.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous session.
    pub fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .insert(session.id().to_string(), session)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Resident and not invalidated.
    #[must_use]
    pub fn get_valid(&self, id: &str) -> Option<Arc<Session>> {
        self.get(id).filter(|session| session.is_valid())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Point-in-time copy of the resident sessions, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        sessions
    }

    /// Drop everything; returns how many sessions were lost.
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        sessions.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
