//! Session store.
//!
//! In-memory mode keeps one async lock per session; a turn holds that lock
//! from `get_or_create` until `save`, so turns for the same session run one
//! after another while different sessions proceed concurrently. Client-echo
//! mode keeps nothing and rebuilds the session from the state the client
//! sent back.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use broker_core::config::SessionMode;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;
use crate::state::SessionData;
use crate::types::ClearStatus;

type SessionSlot = Arc<AsyncMutex<SessionData>>;

/// Exclusive access to one session for the duration of a turn.
pub struct SessionLease {
    id: String,
    is_new: bool,
    data: LeaseData,
}

enum LeaseData {
    Held(OwnedMutexGuard<SessionData>),
    Detached(SessionData),
}

impl SessionLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session was created for this turn.
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

impl Deref for SessionLease {
    type Target = SessionData;

    fn deref(&self) -> &SessionData {
        match &self.data {
            LeaseData::Held(guard) => &**guard,
            LeaseData::Detached(data) => data,
        }
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut SessionData {
        match &mut self.data {
            LeaseData::Held(guard) => &mut **guard,
            LeaseData::Detached(data) => data,
        }
    }
}

/// Per-conversation state keyed by session id.
pub struct SessionStore {
    mode: SessionMode,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Look up a session, creating a fresh one when the id is absent or unknown.
    ///
    /// `echoed` is only consulted in client-echo mode.
    pub async fn get_or_create(
        &self,
        requested: Option<&str>,
        echoed: Option<SessionData>,
    ) -> Result<SessionLease, ChatError> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());

        if self.mode == SessionMode::ClientEcho {
            let mut data = echoed.unwrap_or_default();
            data.conversation_state.user_preferences.normalize();
            let (id, is_new) = match requested {
                Some(id) => (id.to_string(), false),
                None => (Uuid::new_v4().to_string(), true),
            };
            return Ok(SessionLease {
                id,
                is_new,
                data: LeaseData::Detached(data),
            });
        }

        let (id, slot, is_new) = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|e| ChatError::Session(format!("session lock poisoned: {}", e)))?;
            match requested.and_then(|id| sessions.get(id).map(|s| (id, s.clone()))) {
                Some((id, slot)) => (id.to_string(), slot, false),
                None => {
                    let id = Uuid::new_v4().to_string();
                    let slot: SessionSlot = Arc::new(AsyncMutex::new(SessionData::default()));
                    sessions.insert(id.clone(), slot.clone());
                    debug!(session_id = %id, "Created session");
                    (id, slot, true)
                }
            }
        };

        let guard = slot.lock_owned().await;
        Ok(SessionLease {
            id,
            is_new,
            data: LeaseData::Held(guard),
        })
    }

    /// Finish a turn and return the state as persisted.
    ///
    /// In-memory sessions were mutated in place, so this only releases the
    /// lock. Client-echo sessions are returned for embedding in the reply.
    pub fn save(&self, lease: SessionLease) -> SessionData {
        match lease.data {
            LeaseData::Held(guard) => guard.clone(),
            LeaseData::Detached(data) => data,
        }
    }

    /// Forget a session.
    pub fn clear(&self, session_id: &str) -> ClearStatus {
        if self.mode == SessionMode::ClientEcho {
            return ClearStatus::Cleared;
        }
        let removed = self
            .sessions
            .lock()
            .map(|mut s| s.remove(session_id).is_some())
            .unwrap_or(false);
        if removed {
            ClearStatus::Cleared
        } else {
            ClearStatus::NotFound
        }
    }

    /// Number of sessions held in memory.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
