//! The in-memory conversation store.
//!
//! Two levels of locking:
//! - the session map is only locked to look up, insert or evict a slot;
//! - each slot has its own history lock (held for one append or one
//!   snapshot) and its own turn lock (held for a whole agent turn).
//!
//! Mutations on different sessions never contend with each other.

use chrono::{DateTime, Utc};
use crawlpilot_core::{BusyPolicy, Message, SessionError, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

struct Log {
    messages: Vec<Message>,
    updated_at: DateTime<Utc>,
}

struct SessionSlot {
    log: RwLock<Log>,
    turn: Arc<Mutex<()>>,
    created_at: DateTime<Utc>,
}

impl SessionSlot {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            log: RwLock::new(Log {
                messages: Vec::new(),
                updated_at: now,
            }),
            turn: Arc::new(Mutex::new(())),
            created_at: now,
        }
    }

    fn is_running(&self) -> bool {
        self.turn.try_lock().is_err()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.log.read().unwrap_or_else(|e| e.into_inner()).updated_at
    }
}

/// Overview of one session, for listings.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub running: bool,
}

/// Marks a session as running a turn. Dropping it returns the session to idle.
#[derive(Debug)]
pub struct TurnGuard {
    session_id: SessionId,
    _guard: OwnedMutexGuard<()>,
}

impl TurnGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "Turn finished");
    }
}

/// Per-session ordered message logs.
pub struct ConversationStore {
    sessions: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    max_sessions: usize,
}

impl ConversationStore {
    /// Create a store holding at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Create a new empty session and return its id.
    ///
    /// At capacity, the least recently updated idle session is evicted
    /// first. Fails with [`SessionError::AtCapacity`] when none is idle.
    pub fn create_session(&self) -> Result<SessionId, SessionError> {
        let id = SessionId::new();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, slot)| !slot.is_running())
                .min_by_key(|(_, slot)| slot.updated_at())
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!(session_id = %key, "Evicting least recently used session");
                    sessions.remove(&key);
                }
                None => {
                    warn!(
                        sessions = sessions.len(),
                        "Session capacity reached but every session is running"
                    );
                    return Err(SessionError::AtCapacity(self.max_sessions));
                }
            }
        }

        sessions.insert(id.clone(), Arc::new(SessionSlot::new()));
        debug!(session_id = %id, "Session created");
        Ok(id)
    }

    fn slot(&self, id: &SessionId) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Append one message to a session.
    pub fn append(&self, id: &SessionId, message: Message) -> Result<(), SessionError> {
        self.append_all(id, vec![message])
    }

    /// Append several messages under one exclusive acquisition, so readers
    /// see either none or all of them.
    pub fn append_all(&self, id: &SessionId, messages: Vec<Message>) -> Result<(), SessionError> {
        let slot = self.slot(id)?;
        let mut log = slot.log.write().unwrap_or_else(|e| e.into_inner());
        log.messages.extend(messages);
        log.updated_at = Utc::now();
        Ok(())
    }

    /// A consistent snapshot of a session's messages, oldest first.
    pub fn history(&self, id: &SessionId) -> Result<Vec<Message>, SessionError> {
        let slot = self.slot(id)?;
        let log = slot.log.read().unwrap_or_else(|e| e.into_inner());
        Ok(log.messages.clone())
    }

    /// Start a turn on a session.
    ///
    /// Under [`BusyPolicy::Reject`] a session that is already running fails
    /// with [`SessionError::Busy`]; under [`BusyPolicy::Queue`] the caller
    /// waits for the running turn to end.
    pub async fn begin_turn(
        &self,
        id: &SessionId,
        policy: BusyPolicy,
    ) -> Result<TurnGuard, SessionError> {
        let turn = self.slot(id)?.turn.clone();
        let guard = match policy {
            BusyPolicy::Reject => turn
                .try_lock_owned()
                .map_err(|_| SessionError::Busy(id.to_string()))?,
            BusyPolicy::Queue => turn.lock_owned().await,
        };
        debug!(session_id = %id, "Turn started");
        Ok(TurnGuard {
            session_id: id.clone(),
            _guard: guard,
        })
    }

    /// Whether a turn is currently running on the session.
    pub fn is_running(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.slot(id)?.is_running())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Remove a session. Running sessions cannot be evicted.
    pub fn evict(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get(id) {
            None => Err(SessionError::NotFound(id.to_string())),
            Some(slot) if slot.is_running() => Err(SessionError::Busy(id.to_string())),
            Some(_) => {
                sessions.remove(id);
                Ok(())
            }
        }
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Summaries of all sessions, most recently updated first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, slot)| {
                let log = slot.log.read().unwrap_or_else(|e| e.into_inner());
                SessionSummary {
                    id: id.clone(),
                    message_count: log.messages.len(),
                    created_at: slot.created_at,
                    updated_at: log.updated_at,
                    running: slot.is_running(),
                }
            })
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}
